use std::path::PathBuf;

use serde::Serialize;
use tidemark_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::commands::common::CliContext;
use crate::config_profiles::{default_config_path, normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ResolvedConfig {
    profile: String,
    config_path: Option<String>,
    db_path: String,
    owner: String,
    remote_url: Option<String>,
    remote_token_set: bool,
}

pub fn run_config(
    command: ConfigCommands,
    db_path: Option<PathBuf>,
    owner: Option<String>,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            owner,
            remote_url,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            owner,
            remote_url,
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(db_path, owner, global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    owner: Option<String>,
    remote_url: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name =
        apply_config_init(&mut config, profile_name, owner, remote_url, no_activate)?;

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let remote_configured = config
        .profile(&profile_name)
        .and_then(|profile| profile.remote_url())
        .is_some();
    if remote_configured {
        println!("Run `tidemark sync` to sync, or `tidemark sync --watch` to keep syncing.");
    } else {
        println!("Profile '{profile_name}' has no remote_url; notes stay local only.");
    }

    Ok(())
}

/// Merge `config init` flags into `config` and return the profile name used
pub fn apply_config_init(
    config: &mut CliProfilesConfig,
    profile_name: Option<&str>,
    owner: Option<String>,
    remote_url: Option<String>,
    no_activate: bool,
) -> Result<String, CliError> {
    let profile_name = config.resolve_profile_name(profile_name);
    let remote_url = normalize_text_option(remote_url)
        .map(normalize_remote_url)
        .transpose()?;

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = normalize_text_option(owner) {
        profile.owner = Some(value);
    }
    if let Some(value) = remote_url {
        profile.remote_url = Some(value);
    }

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }
    Ok(profile_name)
}

pub fn normalize_remote_url(url: String) -> Result<String, CliError> {
    let normalized = normalize_text_option(Some(url))
        .ok_or_else(|| CliError::Config("remote_url must not be empty".to_string()))?;
    if !is_http_url(&normalized) {
        return Err(CliError::Config(
            "remote_url must include http:// or https://".to_string(),
        ));
    }
    Ok(normalized.trim_end_matches('/').to_string())
}

fn run_config_show(
    db_path: Option<PathBuf>,
    owner: Option<String>,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile = config.resolve_profile_name(global_profile);
    let context = CliContext::resolve(db_path, owner, global_profile)?;

    let resolved = ResolvedConfig {
        profile,
        config_path: default_config_path()
            .ok()
            .map(|path| path.display().to_string()),
        db_path: context.db_path.display().to_string(),
        owner: context.owner.to_string(),
        remote_url: context.remote_url.clone(),
        remote_token_set: context.remote_token.is_some(),
    };
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
