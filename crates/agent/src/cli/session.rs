use tm_domain::config::Config;
use tm_sessions::{FileSessionStore, SessionRecord, SessionStore, SharedSessionMeta};

use crate::agent::{build_manager, build_store};

/// Start or resume the session once and print its metadata.
pub async fn touch(config: &Config, json: bool) -> anyhow::Result<()> {
    if !config.session_tracking.enabled {
        println!("session tracking is disabled");
        return Ok(());
    }
    if !config.session_tracking.persistent {
        eprintln!("note: session_tracking.persistent is off; this session ends with the command");
    }

    let store = build_store(config)?;
    let manager = build_manager(config, store, SharedSessionMeta::new());
    let meta = manager.initialize().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        println!("session: {}", meta.id);
        for (key, value) in meta.attributes.iter().flatten() {
            println!("  {key}: {value}");
        }
    }
    Ok(())
}

/// Print the persisted session record, if any.
pub async fn show(config: &Config) -> anyhow::Result<()> {
    let store = FileSessionStore::at(&config.storage.state_path);
    match store.fetch_user_session().await? {
        Some(record) => print!("{}", describe(&record)),
        None => println!("no stored session ({})", store.path().display()),
    }
    Ok(())
}

fn describe(record: &SessionRecord) -> String {
    let mut out = format!("session:       {}\n", record.session_id);
    out.push_str(&format!("started:       {}\n", format_millis(record.started)));
    out.push_str(&format!(
        "last activity: {}\n",
        format_millis(record.last_activity)
    ));
    if let Some(previous) = record.session_meta.as_ref().and_then(|m| m.previous_session()) {
        out.push_str(&format!("previous:      {previous}\n"));
    }
    out
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_sessions::SessionMeta;

    #[test]
    fn describe_includes_link() {
        let record = SessionRecord {
            session_id: "abc".into(),
            started: 1_672_531_200_000,
            last_activity: 1_672_531_260_000,
            session_meta: Some(SessionMeta::new("abc").with_attribute("previousSession", "xyz")),
        };
        let text = describe(&record);
        assert!(text.contains("session:       abc"));
        assert!(text.contains("2023-01-01T00:01:00+00:00"));
        assert!(text.contains("previous:      xyz"));
    }

    #[tokio::test]
    async fn show_leaves_missing_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.state_path = dir.path().join("state");

        show(&config).await.unwrap();
        assert!(!config.storage.state_path.exists());
    }
}
