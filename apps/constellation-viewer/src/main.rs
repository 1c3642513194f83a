//! Constellation Demo Viewer
//!
//! Renders a generated graph: vertex icons, spine links in the perspective
//! style, chord links in the orthogonal style, and the axes overlay.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p constellation-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! ### Screenshot options
//! - `-S, --screenshot`: Enable screenshot capture mode
//! - `-o, --output <PATTERN>`: Output path pattern (use `{}` for frame number)
//! - `-f, --frames <FRAMES>`: Frame indices to capture (e.g., "0,10,20" or "0-5")
//! - `--exit-after`: Exit after capturing all specified frames
//!
//! ### Graph options
//! - `--vertices <N>`: Vertex count (default: 200)
//! - `--chords <N>`: Random chord links (default: 60)
//! - `--seed <N>`: Generation seed (default: 42)
//!
//! ### Other
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod graph;

use constellation_app::{run_app, AppConfig, ScreenshotConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const TARGET_FPS: u32 = 144;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Viewer>(
        AppConfig::new("Constellation - Graph Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_target_fps(TARGET_FPS)
            .with_vsync(true)
            .with_screenshots(ScreenshotConfig::from_args()),
    )
}

fn print_help() {
    eprintln!(
        "Constellation Demo Viewer

USAGE:
    cargo run -p constellation-viewer -- [OPTIONS]

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: constellation_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture
                            Examples: \"0\" \"0,10,20\" \"0-5\" \"0,5-10,20\"
                            Default: 0
    --exit-after            Exit after capturing all specified frames

GRAPH OPTIONS:
    --vertices <N>          Vertex count (default: 200)
    --chords <N>            Random chord links (default: 60)
    --seed <N>              Generation seed (default: 42)

CONTROLS:
    Space                   Pause or resume the orbit
    Tab                     Select the next vertex
    M                       Morph between sphere and flat layouts

OTHER:
    -h, --help              Print this help message

EXAMPLES:
    # Default graph
    cargo run -p constellation-viewer

    # Capture frames during the orbit and exit
    cargo run -p constellation-viewer -- -S -f 0,50,100 -o graph_{{}}.png --exit-after

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
