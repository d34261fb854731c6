//! Verify the ERA5 fixture against the store named by `ROUNDTRIP_STORE_URI`.
//!
//! ```bash
//! ROUNDTRIP_STORE_URI=/tmp/roundtrip.zarr ROUNDTRIP_WRITE_MODE=overwrite cargo run --example verify_era5
//! ROUNDTRIP_STORE_URI=mongodb+srv://cluster0.example.net/test ROUNDTRIP_STORE_USERNAME=user ROUNDTRIP_STORE_PASSWORD=... \
//!     cargo run --example verify_era5 --features mongodb
//! ```

use roundtrip::{config::VerifierConfig, verify::run_from_config};

fn verify_era5() -> Result<(), Box<dyn std::error::Error>> {
    let config = VerifierConfig::from_env()?;
    println!(
        "Verifying {} against group {} of {}",
        config.fixture_url(),
        config.group_name(),
        roundtrip::store_handle::redact_uri(config.store_uri())
    );
    let report = run_from_config(&config)?;
    println!("{report}");
    Ok(())
}

fn main() {
    if let Err(err) = verify_era5() {
        println!("{err:?}");
        std::process::exit(1);
    }
}
