//! Keypair files.
//!
//! A keypair file is a JSON array of 64 byte values: the ed25519 secret
//! seed followed by the public key.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use custody_crypto::Keypair;

/// Read the keypair at `path`.
pub fn load(path: &Path) -> Result<Keypair> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading keypair {}", path.display()))?;
    let bytes: Vec<u8> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON byte array", path.display()))?;

    Keypair::from_bytes(&bytes).with_context(|| format!("invalid keypair in {}", path.display()))
}

/// Read the keypair at `path`, generating and saving a new one if the file
/// does not exist.
pub fn load_or_generate(path: &Path) -> Result<Keypair> {
    if path.exists() {
        return load(path);
    }

    let keypair = generate()?;
    save(path, &keypair)?;
    tracing::info!("Generated keypair {} at {}", keypair.pubkey(), path.display());
    Ok(keypair)
}

/// Generate a keypair from OS randomness.
pub fn generate() -> Result<Keypair> {
    let mut seed = [0u8; 32];
    getrandom::fill(&mut seed).map_err(|e| anyhow!("OS randomness unavailable: {e}"))?;
    Ok(Keypair::from_seed(seed))
}

/// Write `keypair` to `path`. Refuses to replace an existing file unless
/// `overwrite` is set.
pub fn write(path: &Path, keypair: &Keypair, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    save(path, keypair)
}

fn save(path: &Path, keypair: &Keypair) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let json = serde_json::to_string(&keypair.to_bytes().to_vec())?;
    let mut file =
        options.open(path).with_context(|| format!("creating keypair {}", path.display()))?;

    // The mode only applies to new files; an overwritten file keeps its old bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .with_context(|| format!("restricting permissions of {}", path.display()))?;
    }

    file.write_all(json.as_bytes())
        .with_context(|| format!("writing keypair {}", path.display()))?;
    Ok(())
}
