// The binary uses the library, not duplicate modules
use tile_overlay::{Settings, TileOverlayApp, setup_logging};

fn main() -> std::process::ExitCode {
    let settings = Settings::from_cli();
    setup_logging();

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start the async runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match rt.block_on(TileOverlayApp::new(settings).run()) {
        Ok(summary) => {
            tracing::info!(
                "Done: {} rebuilds, {} tiles displayed, {} rasters written",
                summary.rebuilds,
                summary.overlays_by_file.len(),
                summary.rasters_written
            );
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}
