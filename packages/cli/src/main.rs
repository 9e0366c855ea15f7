#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Waymo camera scan pipeline.

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use waymo_counter_cameras::CameraApi;
use waymo_counter_cameras_models::Camera;
use waymo_counter_database::SupabaseClient;
use waymo_counter_detector::OrtWaymoDetector;
use waymo_counter_scan::{ImageSource, InferenceEngine, persist::persist_scan, run_scan};
use waymo_counter_scan_models::CameraScanResult;
use waymo_counter_service_area::{GeometryError, ServiceArea};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "waymo_counter",
    about = "Waymo counting pipeline for Austin traffic cameras"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full scan cycle and persist the results (default)
    Scan,
    /// List the active cameras inside the service area
    Cameras,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Scan) {
        Commands::Scan => scan_once().await,
        Commands::Cameras => list_cameras().await,
    }
}

/// One complete cycle: fetch the camera list, scan the in-area cameras,
/// persist the outcome. A persistence failure logs the unpersisted summary
/// before exiting non-zero, so the cycle's numbers survive in the job log.
async fn scan_once() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let scan_config = config.scan_config();

    let store = SupabaseClient::new(&config.supabase_url, &config.supabase_key)?;
    let area = load_service_area(config.service_area_path.as_deref())?;
    let detector = OrtWaymoDetector::load(
        &config.model_path,
        &config.model_url,
        &config.target_class,
    )
    .await?;

    let api = Arc::new(CameraApi::new()?);
    let cameras = api.fetch_cameras().await?;

    let (summary, results) = run_scan(
        &cameras,
        &area,
        &scan_config,
        Arc::clone(&api) as Arc<dyn ImageSource>,
        Arc::new(detector) as Arc<dyn InferenceEngine>,
    )
    .await;

    match persist_scan(&store, &cameras, &summary, &results).await {
        Ok(scan_id) => {
            if config.upload_images {
                upload_annotated_frames(&store, &results).await;
            }
            log::info!("Scan {scan_id} recorded");
            Ok(())
        }
        Err(e) => {
            let dump = serde_json::to_string(&summary)
                .unwrap_or_else(|e| format!("<unserializable: {e}>"));
            log::error!("Failed to persist scan: {e}");
            log::error!("Unpersisted summary: {dump}");
            Err(e.into())
        }
    }
}

async fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let area = load_service_area(std::env::var("SERVICE_AREA_PATH").ok().as_deref())?;
    let api = CameraApi::new()?;
    let cameras = api.fetch_cameras().await?;
    let targets = area.filter_cameras(&cameras);

    println!(
        "{:<12} {:<42} {:>10} {:>9}  DISTRICT",
        "ID", "LOCATION", "LONGITUDE", "LATITUDE"
    );
    println!("{}", "-".repeat(86));
    for camera in &targets {
        print_camera(camera);
    }
    println!(
        "{} of {} active cameras are inside the service area",
        targets.len(),
        cameras.len()
    );
    Ok(())
}

fn print_camera(camera: &Camera) {
    let (longitude, latitude) = camera.coordinate().unwrap_or_default();
    let district = camera
        .council_district
        .map_or_else(|| "-".to_string(), |d| d.to_string());
    println!(
        "{:<12} {:<42} {:>10.5} {:>9.5} {:>9}",
        camera.camera_id, camera.location_name, longitude, latitude, district
    );
}

fn load_service_area(path: Option<&str>) -> Result<ServiceArea, GeometryError> {
    match path {
        Some(path) => {
            log::info!("Loading service area polygon from {path}");
            ServiceArea::from_geojson_file(path)
        }
        None => Ok(ServiceArea::default_area()),
    }
}

/// Uploads the annotated frame of every result that carries one. Upload
/// failures are warnings, not errors: the scan is already persisted and the
/// images are supplementary.
async fn upload_annotated_frames(store: &SupabaseClient, results: &[CameraScanResult]) {
    let mut uploaded = 0usize;
    for result in results {
        let Some(jpeg) = &result.annotated_jpeg else {
            continue;
        };
        match store
            .upload_detection_image(&result.camera_id, jpeg.clone())
            .await
        {
            Ok(url) => {
                uploaded += 1;
                log::info!("Uploaded annotated frame for {}: {url}", result.camera_id);
            }
            Err(e) => {
                log::warn!("Failed to upload annotated frame for {}: {e}", result.camera_id);
            }
        }
    }
    if uploaded > 0 {
        log::info!("Uploaded {uploaded} annotated frame(s)");
    }
}
