use tm_domain::config::{Config, ConfigError, ConfigSeverity};

/// Check the loaded config and print a report grouped by severity.
///
/// Returns `false` when at least one error was found; warnings alone pass.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let (report, passed) = render_report(&config.validate(), config_path);
    print!("{report}");
    passed
}

fn render_report(issues: &[ConfigError], config_path: &str) -> (String, bool) {
    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .iter()
        .partition(|issue| issue.severity == ConfigSeverity::Error);

    if issues.is_empty() {
        return (format!("{config_path}: no issues\n"), true);
    }

    let mut out = String::new();
    for issue in errors.iter().chain(&warnings) {
        out.push_str(&format!("{issue}\n"));
    }
    out.push_str(&format!(
        "{config_path}: {} error(s), {} warning(s)\n",
        errors.len(),
        warnings.len()
    ));
    (out, errors.is_empty())
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}
