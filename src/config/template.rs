//! Client identity substitution into the child's config file.
//!
//! The config may live on a read-only filesystem, so every failure here is a
//! warning and the child simply runs with the file as shipped.

use std::path::Path;

use crate::config::schema::ClientIdentity;

pub const UUID_PLACEHOLDER: &str = "${XRAY_CLIENT_UUID}";
pub const EMAIL_PLACEHOLDER: &str = "${XRAY_CLIENT_EMAIL}";

/// What happened to the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// Placeholders were substituted and the file rewritten.
    Rewritten,
    /// The file had no placeholders; nothing was written.
    Unchanged,
    /// The file could not be read or written back.
    Skipped,
}

/// Substitute the client identity placeholders in `path` in place.
pub fn apply_client_template(path: &Path, client: &ClientIdentity) -> TemplateOutcome {
    let original = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not read config file, using it as is"
            );
            return TemplateOutcome::Skipped;
        }
    };

    let processed = original
        .replace(UUID_PLACEHOLDER, &client.uuid)
        .replace(EMAIL_PLACEHOLDER, &client.email);

    if processed == original {
        tracing::debug!(path = %path.display(), "Config file has no client placeholders");
        return TemplateOutcome::Unchanged;
    }

    if let Err(e) = write_private(path, processed.as_bytes()) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Could not write processed config (filesystem may be read-only)"
        );
        return TemplateOutcome::Skipped;
    }

    tracing::info!(path = %path.display(), "Config processed and updated");
    TemplateOutcome::Rewritten
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
