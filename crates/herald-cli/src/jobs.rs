use anyhow::{Context, bail};

use herald_config::HeraldConfig;
use herald_cron::store::JobQueueStore;
use herald_gateway::dispatcher::{parse_send_time, render_jobs};
use herald_gateway::lifecycle::{ListFilter, filter_jobs};

/// Render the queue, filtered the same way as the `schedulemessage` command.
pub fn run_jobs(
    config: &HeraldConfig,
    group: Option<i64>,
    content: Option<String>,
    time: Option<&str>,
) -> anyhow::Result<String> {
    let timestamp = match time {
        Some(raw) => match parse_send_time(raw) {
            Some(ts) => Some(ts),
            None => bail!("invalid time {raw:?}, expected YYYYMMDDHHMM or YYYYMMDDHHMMSS"),
        },
        None => None,
    };

    let queue_file = config.queue_file()?;
    let store = JobQueueStore::open(&queue_file)
        .with_context(|| format!("failed to open job queue {}", queue_file.display()))?;

    let all = store.load_all();
    if all.is_empty() {
        return Ok("The schedule queue is empty.\n".to_string());
    }

    let filter = ListFilter {
        timestamp,
        content,
        target_group: group,
    };
    let jobs = filter_jobs(all, &filter)?;
    if jobs.is_empty() {
        return Ok("No scheduled tasks match your criteria.\n".to_string());
    }
    Ok(render_jobs(&jobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_cron::{JobKind, ScheduledJob};

    fn config_with_jobs(dir: &std::path::Path, jobs: &[ScheduledJob]) -> HeraldConfig {
        let config = HeraldConfig {
            data_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let store = JobQueueStore::open(&config.queue_file().unwrap()).unwrap();
        for job in jobs {
            store.upsert(job).unwrap();
        }
        config
    }

    fn job(content: &str, group: i64) -> ScheduledJob {
        let at = parse_send_time("209901011200").unwrap();
        ScheduledJob::new(JobKind::SendMessage, content, group, at)
    }

    #[test]
    fn test_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_jobs(dir.path(), &[]);
        let out = run_jobs(&config, None, None, None).unwrap();
        assert_eq!(out, "The schedule queue is empty.\n");
    }

    #[test]
    fn test_filters_by_group() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_jobs(dir.path(), &[job("alpha", 1), job("beta", 2)]);
        let out = run_jobs(&config, Some(2), None, None).unwrap();
        assert!(out.starts_with("Scheduled Tasks:\n"));
        assert!(out.contains("beta"));
        assert!(!out.contains("alpha"));
    }

    #[test]
    fn test_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_jobs(dir.path(), &[job("alpha", 1)]);
        let out = run_jobs(&config, None, Some("^zeta".into()), None).unwrap();
        assert_eq!(out, "No scheduled tasks match your criteria.\n");
    }

    #[test]
    fn test_invalid_time_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with_jobs(dir.path(), &[]);
        assert!(run_jobs(&config, None, None, Some("tomorrow")).is_err());
    }
}
