// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Password protection: standard security handler, RC4 128-bit (V2).

use blattwerk_core::error::{BlattwerkError, Result};
use lopdf::{EncryptionState, EncryptionVersion, Object, Permissions, StringFormat};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::handle::DocumentHandle;

const KEY_LENGTH_BITS: usize = 128;

/// Passwords applied by [`DocumentHandle::protect`].
#[derive(Clone, PartialEq, Eq)]
pub struct ProtectionSettings {
    /// Required to open the document. Empty means it opens without a prompt
    /// but the permission set still applies.
    pub user_password: String,
    /// Lifts the permission restrictions.
    pub owner_password: String,
}

impl ProtectionSettings {
    /// Build settings from optional request parameters. A missing owner
    /// password is replaced by a random one so the restrictions cannot be
    /// lifted by guessing.
    pub fn new(user_password: Option<&str>, owner_password: Option<&str>) -> Self {
        let owner_password = match owner_password {
            Some(password) if !password.is_empty() => password.to_string(),
            _ => Uuid::new_v4().simple().to_string(),
        };
        Self {
            user_password: user_password.unwrap_or_default().to_string(),
            owner_password,
        }
    }
}

// Passwords stay out of logs.
impl std::fmt::Debug for ProtectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectionSettings")
            .field("user_password", &"<redacted>")
            .field("owner_password", &"<redacted>")
            .finish()
    }
}

/// Printing (including high quality) is the only permission granted.
/// Modification, copying, annotation, form filling and assembly are denied.
pub fn granted_permissions() -> Permissions {
    Permissions::PRINTABLE | Permissions::PRINTABLE_IN_HIGH_QUALITY
}

impl DocumentHandle {
    /// Encrypt the document with `settings`.
    ///
    /// The info dictionary is stamped before encryption because strings can
    /// no longer be edited in the clear afterwards.
    #[instrument(skip_all, fields(pages = self.page_count()))]
    pub fn protect(&mut self, settings: &ProtectionSettings) -> Result<()> {
        if self.is_encrypted() {
            return Err(BlattwerkError::Validation(
                "document is already encrypted".into(),
            ));
        }

        self.stamp_info()?;
        self.ensure_file_id();

        let version = EncryptionVersion::V2 {
            document: &self.document,
            owner_password: &settings.owner_password,
            user_password: &settings.user_password,
            key_length: KEY_LENGTH_BITS,
            permissions: granted_permissions(),
        };
        let state = EncryptionState::try_from(version)
            .map_err(|err| BlattwerkError::Serialization(format!("encryption setup: {err}")))?;

        self.document
            .encrypt(&state)
            .map_err(|err| BlattwerkError::Serialization(format!("encryption: {err}")))?;
        self.encrypted = true;

        debug!(key_length = KEY_LENGTH_BITS, "document encrypted");
        Ok(())
    }

    /// The file identifier feeds the encryption key, so a document without
    /// one gets a fresh random pair.
    fn ensure_file_id(&mut self) {
        if self.document.trailer.has(b"ID") {
            return;
        }
        let id = Uuid::new_v4().as_bytes().to_vec();
        let part = Object::String(id, StringFormat::Hexadecimal);
        self.document
            .trailer
            .set("ID", Object::Array(vec![part.clone(), part]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_pdf;

    #[test]
    fn protected_document_carries_encrypt_dictionary() {
        let mut doc = DocumentHandle::parse(&sample_pdf(&[(200.0, 200.0)])).expect("parse");
        doc.protect(&ProtectionSettings::new(Some("secret"), Some("owner")))
            .expect("protect");

        let bytes = doc.serialize().expect("serialize");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Encrypt"));
        // The page content is no longer stored in the clear.
        assert!(!text.contains("Page 1"));
    }

    #[test]
    fn protecting_twice_is_rejected() {
        let mut doc = DocumentHandle::parse(&sample_pdf(&[(200.0, 200.0)])).expect("parse");
        let settings = ProtectionSettings::new(None, None);
        doc.protect(&settings).expect("protect");
        assert!(matches!(
            doc.protect(&settings),
            Err(BlattwerkError::Validation(_))
        ));
    }

    #[test]
    fn missing_owner_password_is_randomised() {
        let a = ProtectionSettings::new(None, None);
        let b = ProtectionSettings::new(None, Some(""));
        assert!(a.user_password.is_empty());
        assert_eq!(a.owner_password.len(), 32);
        assert_ne!(a.owner_password, b.owner_password);
    }

    #[test]
    fn debug_output_hides_passwords() {
        let settings = ProtectionSettings::new(Some("hunter2"), Some("owner"));
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn only_printing_is_permitted() {
        let permissions = granted_permissions();
        assert!(permissions.contains(Permissions::PRINTABLE));
        assert!(!permissions.contains(Permissions::MODIFIABLE));
        assert!(!permissions.contains(Permissions::COPYABLE));
        assert!(!permissions.contains(Permissions::ANNOTABLE));
        assert!(!permissions.contains(Permissions::FILLABLE));
        assert!(!permissions.contains(Permissions::ASSEMBLABLE));
    }
}
