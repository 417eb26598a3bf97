//! Command-line interface for bundle_services

use argh::FromArgs;

/// Dependency-ordered lifecycle manager for bundle services
#[derive(FromArgs, Debug)]
pub struct ServicesArgs {
    /// path to the bundle manifest (default: bundles.yaml)
    #[argh(positional, default = "String::from(\"bundles.yaml\")")]
    pub manifest: String,

    /// only load these bundles (comma-separated)
    #[argh(option, short = 'b', from_str_fn(parse_list))]
    pub bundles: Option<Vec<String>>,

    /// show the activation plan without constructing services
    #[argh(switch)]
    pub dry_run: bool,

    /// validate the manifest and dependency graph, then exit
    #[argh(switch)]
    pub validate: bool,

    /// keep the services alive until Ctrl+C
    #[argh(switch)]
    pub wait: bool,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse comma-separated list
fn parse_list(s: &str) -> Result<Vec<String>, String> {
    let items: Vec<String> = s
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return Err(format!("Invalid list '{}'. Expected 'a,b,c'", s));
    }
    Ok(items)
}

impl ServicesArgs {
    /// Normalized log filter, falling back to "info"
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}
