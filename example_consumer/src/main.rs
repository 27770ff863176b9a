//! Example consumer: a separate crate that hosts a catalog package on mosaic-sdk.
//!
//! Run from repo root: `cargo run -p example-consumer -- dev-server --port 8080`
//! Requires `DATABASE_URL` (or `MOSAIC_DATABASE_URL`), e.g. in a `.env` file.

mod catalog;

use clap::Parser;
use mosaic_sdk::cli::Cli;
use mosaic_sdk::Application;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let builder = Application::builder()
        .info("example-consumer", env!("CARGO_PKG_VERSION"))
        .package("/catalog", catalog::package()?)
        .package_setting("catalog", "currency", "EUR");
    cli.run(builder)?;
    Ok(())
}
