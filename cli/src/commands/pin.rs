//! Pin/unpin commands - persist a preferred backend.

use anyhow::{bail, Result};
use runbridge_core::{BackendKind, ConfigStore};
use serde_json::json;

pub async fn pin(backend: BackendKind, json: bool) -> Result<()> {
    if !backend.is_available() {
        bail!("cannot pin '{}'; choose cluster or container", backend);
    }

    let store = ConfigStore::new()?;
    store.set_pinned_backend(Some(backend)).await?;

    if json {
        println!("{}", json!({ "pinned": backend }));
    } else {
        println!(
            "Pinned backend: {} (detection still falls back if it is unusable)",
            backend
        );
    }
    Ok(())
}

pub async fn unpin(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let previous = store.load().await?.pinned_backend;
    store.set_pinned_backend(None).await?;

    if json {
        println!("{}", json!({ "pinned": null, "previous": previous }));
    } else {
        match previous {
            Some(backend) => println!("Unpinned backend: {}", backend),
            None => println!("No backend was pinned."),
        }
    }
    Ok(())
}
