//! Persistent cryptographic identity (§3 "Identity").
//!
//! An Ed25519 keypair is generated once and marshalled to
//! `<data_dir>/identity.key` with owner-only permissions. Every subsequent
//! start loads the same file, so the derived libp2p `PeerId` — this node's
//! name on the wire — never changes across restarts.

use anyhow::{Context, Result};
use libp2p::identity::Keypair;
use libp2p::PeerId;
use std::path::{Path, PathBuf};

const IDENTITY_FILE: &str = "identity.key";

/// Loaded or freshly generated node identity.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl Identity {
    /// Load `<data_dir>/identity.key`, generating and persisting a new
    /// Ed25519 keypair if the file is absent.
    pub async fn load_or_generate(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        let path = data_dir.join(IDENTITY_FILE);

        let keypair = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            Self::read_keypair(&path).await?
        } else {
            let keypair = Keypair::generate_ed25519();
            Self::write_keypair(&path, &keypair).await?;
            keypair
        };

        let peer_id = PeerId::from(keypair.public());
        Ok(Self { keypair, peer_id })
    }

    async fn read_keypair(path: &Path) -> Result<Keypair> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading identity file {}", path.display()))?;
        Keypair::from_protobuf_encoding(&bytes).context("decoding persisted identity key")
    }

    async fn write_keypair(path: &Path, keypair: &Keypair) -> Result<()> {
        let bytes = keypair
            .to_protobuf_encoding()
            .context("encoding identity key")?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("writing identity file {}", path.display()))?;
        set_owner_only(path).await?;
        Ok(())
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn identity_file(data_dir: impl AsRef<Path>) -> PathBuf {
        data_dir.as_ref().join(IDENTITY_FILE)
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
    })
    .await
    .context("joining permission-setting task")?
    .with_context(|| format!("setting 0600 permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Property 1: identity persistence — two successive starts from the
    // same data directory yield the same peer id, and the file has
    // owner-only permissions.
    #[tokio::test]
    async fn identity_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();

        let first = Identity::load_or_generate(dir.path()).await.unwrap();
        let second = Identity::load_or_generate(dir.path()).await.unwrap();

        assert_eq!(first.peer_id(), second.peer_id());

        let path = Identity::identity_file(dir.path());
        assert!(path.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn peer_id_matches_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::load_or_generate(dir.path()).await.unwrap();
        let expected = PeerId::from(identity.keypair().public());
        assert_eq!(identity.peer_id(), expected);
    }
}
