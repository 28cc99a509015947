use anyhow::Context;
use clap::ArgMatches;
use forge_artifact::ArtifactStore;
use forge_server::{cli, logging};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli::command().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    logging::init(level, matches.get_flag("log-json"));

    let config = cli::load_config(&matches)?;

    match matches.subcommand() {
        Some(("serve", _)) => forge_server::serve(&config).await,
        Some(("generate", sub)) => {
            let prompt = sub.get_one::<String>("prompt").map_or("", String::as_str);
            let state = forge_server::build_state(&config);
            let report = state.orchestrator.generate(prompt).await?;
            tracing::info!(
                run = %report.run_id,
                kind = %report.final_kind,
                elapsed_ms = report.elapsed_ms(),
                "asset ready"
            );
            println!("{}\t{}", report.run_id, report.final_artifact.display());
            Ok(())
        }
        Some(("resolve", sub)) => resolve(&config.storage_root, sub),
        Some(("transplant", sub)) => transplant(sub).await,
        _ => anyhow::bail!("no subcommand given"),
    }
}

fn resolve(root: &std::path::Path, sub: &ArgMatches) -> anyhow::Result<()> {
    let id = sub.get_one::<String>("id").map_or("", String::as_str);
    let store = ArtifactStore::new(root);
    let resolved = store
        .resolve_final(id)
        .with_context(|| format!("resolving {id}"))?;
    println!("{}\t{}", resolved.kind, resolved.path.display());
    Ok(())
}

async fn transplant(sub: &ArgMatches) -> anyhow::Result<()> {
    let path = |name: &str| sub.get_one::<PathBuf>(name).cloned().unwrap_or_default();
    let (source, target, output) = (path("source"), path("target"), path("output"));

    let report = tokio::task::spawn_blocking(move || {
        forge_scene::transplant_file(&source, &target, &output)
    })
    .await??;
    tracing::info!(
        passthrough = report.passthrough,
        materials = report.materials,
        matched = report.matched_primitives,
        "transplant finished"
    );
    Ok(())
}
