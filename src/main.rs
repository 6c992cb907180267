#[macro_use]
extern crate rocket;

use std::sync::Arc;

use rocket::{Build, Rocket};

use handler::{
    api_handler::api_version,
    evidence_handler::{
        create_evidence, create_folder, get_evidence, get_folder_contents, get_statistics,
        get_tree, reconcile, touch_evidence,
    },
    node_handler::{delete_node, download_file, get_node, move_node, rename_node, upload_file},
    search_handler::search_files,
};

use crate::blob::DiskBlobStore;
use crate::config::{init_logging, parse_config};
use crate::processing::client::HttpProcessingClient;
use crate::processing::release_interrupted;
use crate::queue::ProcessingQueue;
use crate::repository::Database;
use crate::state::AppState;

mod approval;
mod blob;
mod config;
mod guard;
mod handler;
mod locks;
mod model;
mod processing;
mod queue;
mod repository;
mod service;
mod state;

#[launch]
async fn rocket() -> Rocket<Build> {
    let config = parse_config().expect("Failed to read EvidenceStore.toml");
    init_logging(&config.logging).expect("Failed to set up logging");
    let db = Database::new(&config.database.location);
    db.initialize().expect("Failed to initialize database");
    let blobs = DiskBlobStore::new(&config.blobs.directory);
    blobs
        .initialize()
        .await
        .expect("Failed to initialize blob directory");
    let processing =
        HttpProcessingClient::new(&config.processing).expect("Failed to build processing client");
    let queue = if config.rabbit_mq.enabled {
        match ProcessingQueue::rabbit(db.clone(), &config.rabbit_mq).await {
            Ok(queue) => queue,
            Err(e) => {
                log::warn!("Failed to connect to rabbit, processing jobs will stay in this process: {e:?}");
                ProcessingQueue::local(db.clone())
            }
        }
    } else {
        ProcessingQueue::local(db.clone())
    };
    let state = AppState::new(db, Arc::new(blobs), queue, Arc::new(processing));
    // anything a crash left mid-run goes back in line before the workers start picking jobs up
    let interrupted = release_interrupted(&state.db).unwrap_or_else(|e| {
        log::error!("Failed to release interrupted processing runs. Exception is {e:?}");
        Vec::new()
    });
    state
        .queue
        .start(state.pipeline(), config.processing.workers)
        .await;
    for file_id in interrupted {
        if let Err(e) = state.queue.dispatch(file_id).await {
            log::warn!("Failed to re-queue file {file_id}: {e:?}");
        }
    }
    build_rocket(state)
}

/// mounts every route onto a rocket managing `state`
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    rocket::build()
        .manage(state)
        .mount("/api", routes![api_version])
        .mount(
            "/evidence",
            routes![
                create_evidence,
                get_evidence,
                touch_evidence,
                get_tree,
                get_folder_contents,
                get_statistics,
                create_folder,
                reconcile,
                upload_file
            ],
        )
        .mount(
            "/nodes",
            routes![
                get_node,
                download_file,
                rename_node,
                move_node,
                delete_node,
                approval::handler::approve_file,
                approval::handler::reject_file,
                processing::handler::reprocess_file
            ],
        )
        .mount("/files", routes![search_files])
}
