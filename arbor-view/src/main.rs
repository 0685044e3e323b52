//! Application entry point for the Arbor tree growth viewer.
//!
//! This binary sets up logging and eframe/egui and delegates all
//! interactive logic and rendering to [`Viewer`] from the `viewer` module.

mod viewer;

use arbor_core::config::GrowthParameters;
use viewer::Viewer;

/// Starts the native eframe application.
///
/// An optional first argument names a TOML file with growth parameters.
/// If it cannot be read or is invalid, the error is logged and the
/// defaults are used instead. Set `RUST_LOG=debug` to follow the growth.
///
/// ### Returns
/// - `Ok(())` if the application runs to completion without errors.
/// - `Err` if eframe fails to create the native window or event loop.
fn main() -> eframe::Result<()> {
    env_logger::init();

    let params = match std::env::args().nth(1) {
        Some(path) => match GrowthParameters::load(&path) {
            Ok(params) => {
                log::info!("loaded growth parameters from {path}");
                params
            }
            Err(err) => {
                log::error!("{path}: {err}; falling back to defaults");
                GrowthParameters::default()
            }
        },
        None => GrowthParameters::default(),
    };

    eframe::run_native(
        "Arbor",
        eframe::NativeOptions::default(),
        Box::new(|_cc| Ok(Box::new(Viewer::new(params)))),
    )
}
