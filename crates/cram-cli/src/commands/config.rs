use cram_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config::{default_config_path, CliConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            pull_page_size,
            max_pull_pages,
        } => {
            let path = default_config_path()?;
            let existing = CliConfig::load_from_path(&path)?;
            let merged = merge_config(
                existing,
                supabase_url,
                supabase_anon_key,
                pull_page_size,
                max_pull_pages,
            )?;
            merged.save_to_path(&path)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = CliConfig::load()?;
            for line in describe_config(&config)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Overlay explicit values on the stored config and validate the remote pair.
pub fn merge_config(
    mut config: CliConfig,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    pull_page_size: Option<usize>,
    max_pull_pages: Option<usize>,
) -> Result<CliConfig, CliError> {
    if let Some(url) = normalize_text_option(supabase_url) {
        config.supabase_url = Some(url);
    }
    if let Some(key) = normalize_text_option(supabase_anon_key) {
        config.supabase_anon_key = Some(key);
    }
    config.pull_page_size = pull_page_size.or(config.pull_page_size);
    config.max_pull_pages = max_pull_pages.or(config.max_pull_pages);

    config.remote()?;
    Ok(config)
}

pub fn describe_config(config: &CliConfig) -> Result<Vec<String>, CliError> {
    let settings = config.sync_settings();
    let remote = config
        .remote()?
        .map_or_else(|| "(not configured)".to_string(), |remote| remote.url().to_string());
    Ok(vec![
        format!("remote          {remote}"),
        format!("database        {}", config.resolve_db_path(None)?.display()),
        format!("pull page size  {}", settings.pull_page_size),
        format!("max pull pages  {}", settings.max_pull_pages),
        format!("offline         {}", config.offline),
    ])
}
