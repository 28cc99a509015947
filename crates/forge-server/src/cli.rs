//! Command line definition and config overrides

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use forge_core::ForgeConfig;
use std::path::PathBuf;

/// The `rigforge` command
#[must_use]
pub fn command() -> Command {
    Command::new("rigforge")
        .version(forge_core::VERSION)
        .about("Text prompt to rigged, textured 3D asset")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("FORGE_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log level when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("storage-root")
                .long("storage-root")
                .global(true)
                .env("FORGE_STORAGE_ROOT")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding one subdirectory per run"),
        )
        .arg(
            Arg::new("conda-env")
                .long("conda-env")
                .global(true)
                .env("FORGE_CONDA_ENV")
                .help("Conda environment the tools run in"),
        )
        .arg(
            Arg::new("shell")
                .long("shell")
                .global(true)
                .env("FORGE_SHELL")
                .value_parser(value_parser!(PathBuf))
                .help("Shell used to activate the environment"),
        )
        .arg(
            Arg::new("conda-activate")
                .long("conda-activate")
                .global(true)
                .env("FORGE_CONDA_ACTIVATE")
                .value_parser(value_parser!(PathBuf))
                .help("Script that defines the conda shell function"),
        )
        .arg(
            Arg::new("no-conda")
                .long("no-conda")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Launch tools directly on the host"),
        )
        .arg(
            Arg::new("rig-seed")
                .long("rig-seed")
                .global(true)
                .env("FORGE_RIG_SEED")
                .value_parser(value_parser!(u64))
                .help("Seed passed to skeleton prediction"),
        )
        .arg(
            Arg::new("image-tool-root")
                .long("image-tool-root")
                .global(true)
                .env("FORGE_IMAGE_TOOL_ROOT")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mesh-tool-root")
                .long("mesh-tool-root")
                .global(true)
                .env("FORGE_MESH_TOOL_ROOT")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("rig-tool-root")
                .long("rig-tool-root")
                .global(true)
                .env("FORGE_RIG_TOOL_ROOT")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the HTTP API")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .env("FORGE_HOST")
                        .help("Listen host"),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .env("FORGE_PORT")
                        .value_parser(value_parser!(u16))
                        .help("Listen port"),
                )
                .arg(
                    Arg::new("no-warm-up")
                        .long("no-warm-up")
                        .action(ArgAction::SetTrue)
                        .help("Load the image model on first request instead of at startup"),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("Run the pipeline once and print the deliverable path")
                .arg(
                    Arg::new("prompt")
                        .long("prompt")
                        .short('p')
                        .required(true)
                        .help("Text description of the object"),
                )
                .arg(
                    Arg::new("no-materials")
                        .long("no-materials")
                        .action(ArgAction::SetTrue)
                        .help("Skip the material transplant"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Print the deliverable of a stored run")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .help("Run identifier or unique prefix"),
                ),
        )
        .subcommand(
            Command::new("transplant")
                .about("Copy materials from one GLB onto another")
                .arg(
                    Arg::new("source")
                        .long("source")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Textured scene donating materials"),
                )
                .arg(
                    Arg::new("target")
                        .long("target")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Rigged scene receiving them"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

/// Config file (or defaults) with command line overrides applied
///
/// # Errors
/// Returns an error if the config file cannot be read or parsed.
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<ForgeConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ForgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ForgeConfig::default(),
    };

    if let Some(root) = matches.get_one::<PathBuf>("storage-root") {
        config.storage_root.clone_from(root);
    }
    if let Some(name) = matches.get_one::<String>("conda-env") {
        config.environment.env_name.clone_from(name);
    }
    if let Some(shell) = matches.get_one::<PathBuf>("shell") {
        config.environment.shell.clone_from(shell);
    }
    if let Some(script) = matches.get_one::<PathBuf>("conda-activate") {
        config.environment.activate_script.clone_from(script);
    }
    if matches.get_flag("no-conda") {
        config.environment.use_conda = false;
    }
    if let Some(seed) = matches.get_one::<u64>("rig-seed") {
        config.rig_seed = *seed;
    }
    if let Some(root) = matches.get_one::<PathBuf>("image-tool-root") {
        config.tools.image_root.clone_from(root);
    }
    if let Some(root) = matches.get_one::<PathBuf>("mesh-tool-root") {
        config.tools.mesh_root.clone_from(root);
    }
    if let Some(root) = matches.get_one::<PathBuf>("rig-tool-root") {
        config.tools.rig_root.clone_from(root);
    }

    match matches.subcommand() {
        Some(("serve", sub)) => {
            if let Some(host) = sub.get_one::<String>("host") {
                config.server.host.clone_from(host);
            }
            if let Some(port) = sub.get_one::<u16>("port") {
                config.server.port = *port;
            }
            if sub.get_flag("no-warm-up") {
                config.server.warm_up = false;
            }
        }
        Some(("generate", sub)) if sub.get_flag("no-materials") => {
            config.reapply_materials = false;
        }
        _ => {}
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(args: &[&str]) -> ArgMatches {
        command().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        command().debug_assert();
    }

    #[test]
    fn defaults_without_overrides() {
        let config = load_config(&parse(&["rigforge", "resolve", "abc"])).unwrap();
        assert_eq!(config, ForgeConfig::default());
    }

    #[test]
    fn serve_overrides() {
        let matches = parse(&[
            "rigforge",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
            "--no-warm-up",
            "--storage-root",
            "/srv/rigs",
        ]);
        let config = load_config(&matches).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.warm_up);
        assert_eq!(config.storage_root, Path::new("/srv/rigs"));
    }

    #[test]
    fn generate_overrides() {
        let matches = parse(&[
            "rigforge",
            "--no-conda",
            "--rig-seed",
            "7",
            "generate",
            "--prompt",
            "a red chair",
            "--no-materials",
        ]);
        let config = load_config(&matches).unwrap();
        assert!(!config.environment.use_conda);
        assert_eq!(config.rig_seed, 7);
        assert!(!config.reapply_materials);
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<String>("prompt").unwrap(), "a red chair");
    }

    #[test]
    fn transplant_requires_all_paths() {
        let err = command()
            .try_get_matches_from(["rigforge", "transplant", "--source", "a.glb"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(command()
            .try_get_matches_from(["rigforge", "serve", "--port", "http"])
            .is_err());
    }
}
