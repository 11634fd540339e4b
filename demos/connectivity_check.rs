//! Connectivity check against a running SHSWorks instance.
//!
//! Reads the connection settings, queries the version and camera settings,
//! then runs one evaluation and prints the pass/fail values by name.
//!
//! ```bash
//! cargo run --example connectivity_check
//! ```

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shsworks_client::{ClientConfig, ShsClient, ShsError};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "shsworks_client=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = ClientConfig::load_default()?;
    tracing::info!(host = %config.host, port = config.port, "connecting to SHSWorks");

    let mut client = ShsClient::from_config(&config);
    client.connect()?;

    let version = client.get_version()?;
    println!("SHSWorks {version}");

    let settings = client.get_cam_settings()?;
    for (camera, tokens) in &settings {
        println!("{camera} camera:");
        for (token, value) in tokens {
            println!("  {token} = {value}");
        }
    }

    println!("Running evaluation...");
    match client.evaluation() {
        Ok(result) => {
            let names = client.get_pf_names_by_index()?;
            for (index, value) in result.iter() {
                let name = names
                    .get(&index)
                    .map(String::as_str)
                    .unwrap_or("(unnamed)");
                println!("  {name} = {value}");
            }
        }
        Err(ShsError::PassFailEvaluationOff) => {
            println!("  pass/fail evaluation is switched off");
        }
        Err(ShsError::NoPassFailItemsSelected) => {
            println!("  no pass/fail items are selected");
        }
        Err(err) => return Err(err.into()),
    }

    client.close();
    Ok(())
}
