//! Handshake packets, exchanged once at connection start.
use std::fmt;

use super::{Buffer, ClientCode, Feature, Reader, ServerCode};
use crate::error::{Context, Result};

/// Client identity and version, sent as the first packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHello {
    pub name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ClientHello {
    pub fn encode(&self, b: &mut Buffer) {
        ClientCode::Hello.encode(b);
        b.put_string(&self.name);
        b.put_uvarint(self.major);
        b.put_uvarint(self.minor);
        b.put_uvarint(self.revision);
        b.put_string(&self.database);
        b.put_string(&self.user);
        b.put_string(&self.password);
    }

    /// Decodes the payload following the packet code.
    pub fn decode(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.name = r.str().context("client name")?;
        self.major = r.uvarint().context("major version")?;
        self.minor = r.uvarint().context("minor version")?;
        self.revision = r.uvarint().context("protocol revision")?;
        self.database = r.str().context("database")?;
        self.user = r.str().context("user")?;
        self.password = r.str().context("password")?;
        Ok(())
    }
}

/// Server identity, version and timezone, sent in reply to [`ClientHello`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHello {
    pub name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub timezone: String,
    pub display_name: String,
    pub patch: u64,
}

impl ServerHello {
    /// Encodes the packet, including only the fields `revision` knows about.
    pub fn encode_aware(&self, b: &mut Buffer, revision: u64) {
        ServerCode::Hello.encode(b);
        b.put_string(&self.name);
        b.put_uvarint(self.major);
        b.put_uvarint(self.minor);
        b.put_uvarint(self.revision);
        if Feature::Timezone.in_version(revision) {
            b.put_string(&self.timezone);
        }
        if Feature::DisplayName.in_version(revision) {
            b.put_string(&self.display_name);
        }
        if Feature::VersionPatch.in_version(revision) {
            b.put_uvarint(self.patch);
        }
    }

    /// Decodes the payload following the packet code. Optional fields are
    /// gated by the lower of `own` and the revision the server reports.
    pub fn decode_aware(&mut self, r: &mut Reader<'_>, own: u64) -> Result<()> {
        self.name = r.str().context("server name")?;
        self.major = r.uvarint().context("major version")?;
        self.minor = r.uvarint().context("minor version")?;
        self.revision = r.uvarint().context("protocol revision")?;

        let revision = self.revision.min(own);
        if Feature::Timezone.in_version(revision) {
            self.timezone = r.str().context("timezone")?;
        }
        if Feature::DisplayName.in_version(revision) {
            self.display_name = r.str().context("display name")?;
        }
        if Feature::VersionPatch.in_version(revision) {
            self.patch = r.uvarint().context("version patch")?;
        }
        Ok(())
    }
}

impl fmt::Display for ServerHello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}.{} (revision {}, timezone {})",
            self.name, self.major, self.minor, self.patch, self.revision, self.timezone
        )
    }
}
