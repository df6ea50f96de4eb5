//! Prints the grouped updates without touching the remote.
use std::path::Path;
use tokio::fs;

use crate::{
    Result,
    cli::{Args, common},
    manifest::ManifestRegistry,
};

pub async fn execute(args: &Args, out_file: Option<String>) -> Result<()> {
    let config = common::load_config(args)?;
    let manifests = ManifestRegistry::with_defaults()?;
    let groups =
        common::scan_groups(&config, &manifests, &args.repo_path).await?;
    let json = serde_json::json!(groups);
    print_json(json, out_file).await
}

async fn print_json(
    json: serde_json::Value,
    out_file: Option<String>,
) -> Result<()> {
    if let Some(out_file) = out_file {
        let file_path = Path::new(&out_file);

        if let Some(parent) = file_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(&json)?;
        log::info!("writing json to: {}", file_path.display());
        fs::write(file_path, &content).await?;
    } else {
        println!("{json}");
    }

    Ok(())
}
