// Snapshot persistence: one JSON file per user in the data directory,
// rewritten after every reconciled mutation.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::state::{SessionCache, UserId};

fn snapshot_path(data_dir: &str, user_id: UserId) -> PathBuf {
    Path::new(data_dir).join(format!("gram_state_{user_id}.json"))
}

/// Persistence failures are logged and swallowed: a missed write costs a
/// re-fetch on the next restore, never a crashed session.
pub(super) fn save(data_dir: &str, cache: &SessionCache) {
    if let Err(e) = try_save(data_dir, cache) {
        tracing::warn!(error = %e, "failed to persist session snapshot");
    }
}

fn try_save(data_dir: &str, cache: &SessionCache) -> anyhow::Result<()> {
    let path = snapshot_path(data_dir, cache.current_user);
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {data_dir}"))?;
    let bytes = serde_json::to_vec(cache).context("serializing session snapshot")?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Loads the snapshot for `user_id`, or `None` when it is missing, does
/// not parse, or belongs to a different user.
pub(super) fn load(data_dir: &str, user_id: UserId) -> Option<SessionCache> {
    let path = snapshot_path(data_dir, user_id);
    let bytes = std::fs::read(&path).ok()?;
    let cache: SessionCache = match serde_json::from_slice(&bytes) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt session snapshot ignored");
            return None;
        }
    };
    if cache.current_user != user_id {
        tracing::warn!(
            path = %path.display(),
            snapshot_user = cache.current_user,
            "snapshot belongs to a different user, ignoring"
        );
        return None;
    }
    Some(cache)
}
