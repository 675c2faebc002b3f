//! Server configuration, assembled from CLI flags and environment fallbacks
//! (spec.md §4.16/§6). Unlike the prior TOML-file configuration layer, this
//! crate's surface is flag-driven: there is no on-disk structured config
//! format to load, only the token/bind/port/log-dir knobs the `serve`
//! subcommand exposes.

use std::fs;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use rand::RngCore;

/// Resolved server configuration for one `serve` invocation.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub token: String,
    pub log_dir: PathBuf,
    pub web_dir: Option<PathBuf>,
}

/// Raw CLI inputs prior to token-source resolution, mirroring the flags in
/// spec.md §6.
pub struct ServeArgs {
    pub bind: String,
    pub port: u16,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub generate_dev_token: bool,
    pub web_dir: Option<PathBuf>,
}

/// Resolves the bearer token and builds the final [`Config`].
///
/// Precedence: `--token` > `--token-file` > `RC_TOKEN` > `RC_TOKEN_FILE` >
/// (if `--generate-dev-token`) a freshly generated dev token written to
/// `<log_dir>/.dev-token`. Absence of any source is fatal — the caller is
/// expected to exit the process on `Err`.
pub fn resolve(args: ServeArgs) -> Result<Config, String> {
    let token = resolve_token(&args)?;

    if args.bind == "0.0.0.0" {
        tracing::warn!("binding to 0.0.0.0 — service is exposed to the network");
    }

    Ok(Config {
        bind: args.bind,
        port: args.port,
        token,
        log_dir: args.log_dir,
        web_dir: args.web_dir,
    })
}

fn resolve_token(args: &ServeArgs) -> Result<String, String> {
    if let Some(t) = &args.token {
        if !t.is_empty() {
            return Ok(t.clone());
        }
    }
    if let Some(path) = &args.token_file {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("reading --token-file {}: {e}", path.display()))?;
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    if let Ok(t) = std::env::var("RC_TOKEN") {
        if !t.is_empty() {
            return Ok(t);
        }
    }
    if let Ok(path) = std::env::var("RC_TOKEN_FILE") {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("reading RC_TOKEN_FILE {path}: {e}"))?;
        let trimmed = contents.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }
    if args.generate_dev_token {
        return generate_dev_token(&args.log_dir);
    }
    Err("no auth token set: use --token, --token-file, RC_TOKEN, RC_TOKEN_FILE, or --generate-dev-token".to_string())
}

/// Writes 16 random bytes hex-encoded to `<log_dir>/.dev-token`, mode 0600.
fn generate_dev_token(log_dir: &Path) -> Result<String, String> {
    fs::create_dir_all(log_dir).map_err(|e| format!("creating log dir: {e}"))?;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    let path = log_dir.join(".dev-token");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)
        .map_err(|e| format!("writing dev token to {}: {e}", path.display()))?;
    use std::io::Write;
    file.write_all(token.as_bytes())
        .map_err(|e| format!("writing dev token: {e}"))?;
    tracing::warn!(
        "generated dev token at {} — use as Bearer token, do not expose",
        path.display()
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_token_wins_over_everything() {
        let args = ServeArgs {
            bind: "127.0.0.1".into(),
            port: 8765,
            token: Some("explicit".into()),
            token_file: None,
            log_dir: PathBuf::from("/tmp/rc-host-test-logs"),
            generate_dev_token: false,
            web_dir: None,
        };
        let cfg = resolve(args).unwrap();
        assert_eq!(cfg.token, "explicit");
    }

    #[test]
    fn missing_token_source_is_fatal() {
        std::env::remove_var("RC_TOKEN");
        std::env::remove_var("RC_TOKEN_FILE");
        let args = ServeArgs {
            bind: "127.0.0.1".into(),
            port: 8765,
            token: None,
            token_file: None,
            log_dir: PathBuf::from("/tmp/rc-host-test-logs-2"),
            generate_dev_token: false,
            web_dir: None,
        };
        assert!(resolve(args).is_err());
    }
}
