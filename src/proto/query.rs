//! Query packet and the client info it carries.
//!
//! Setting and parameter values are opaque strings; interpreting them is up
//! to the query handler.
use super::{Buffer, ClientCode, Feature, Reader};
use crate::error::{Context, Error, Result};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl TryFrom<u64> for $name {
            type Error = Error;

            fn try_from(v: u64) -> Result<Self> {
                match v {
                    $($value => Ok($name::$variant),)+
                    v => Err(Error::InvalidData(format!(
                        concat!("unknown ", stringify!($name), " {}"),
                        v
                    ))),
                }
            }
        }
    };
}

wire_enum! {
    QueryKind {
        #[default]
        None = 0,
        Initial = 1,
        Secondary = 2,
    }
}

wire_enum! {
    Interface {
        #[default]
        Tcp = 1,
        Http = 2,
    }
}

wire_enum! {
    /// Processing stage the client asks the server to reach.
    Stage {
        FetchColumns = 0,
        WithMergeableState = 1,
        #[default]
        Complete = 2,
    }
}

wire_enum! {
    /// Whether data blocks of the query travel in compression frames.
    Compression {
        #[default]
        Disabled = 0,
        Enabled = 1,
    }
}

/// Trace context propagated with a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub trace_state: String,
    pub trace_flags: u8,
}

/// Description of the client and of the initial query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub kind: QueryKind,

    pub initial_user: String,
    pub initial_query_id: String,
    pub initial_address: String,
    pub initial_start_time_us: u64,

    pub interface: Interface,

    pub os_user: String,
    pub client_hostname: String,
    pub client_name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub patch: u64,

    pub http_method: u8,
    pub http_user_agent: String,
    pub forwarded_for: String,
    pub http_referer: String,

    pub quota_key: String,
    pub distributed_depth: u64,
    pub trace: Option<TraceContext>,

    pub collaborate_with_initiator: u64,
    pub count_participating_replicas: u64,
    pub number_of_current_replica: u64,
}

impl ClientInfo {
    pub fn encode_aware(&self, b: &mut Buffer, revision: u64) {
        b.put_u8(self.kind as u8);
        if self.kind == QueryKind::None {
            return;
        }

        b.put_string(&self.initial_user);
        b.put_string(&self.initial_query_id);
        b.put_string(&self.initial_address);
        if Feature::QueryStartTime.in_version(revision) {
            b.put_u64(self.initial_start_time_us);
        }

        b.put_u8(self.interface as u8);
        match self.interface {
            Interface::Tcp => {
                b.put_string(&self.os_user);
                b.put_string(&self.client_hostname);
                b.put_string(&self.client_name);
                b.put_uvarint(self.major);
                b.put_uvarint(self.minor);
                b.put_uvarint(self.revision);
            }
            Interface::Http => {
                b.put_u8(self.http_method);
                b.put_string(&self.http_user_agent);
                if Feature::XForwardedForInClientInfo.in_version(revision) {
                    b.put_string(&self.forwarded_for);
                }
                if Feature::RefererInClientInfo.in_version(revision) {
                    b.put_string(&self.http_referer);
                }
            }
        }

        if Feature::QuotaKeyInClientInfo.in_version(revision) {
            b.put_string(&self.quota_key);
        }
        if Feature::DistributedDepth.in_version(revision) {
            b.put_uvarint(self.distributed_depth);
        }
        if self.interface == Interface::Tcp && Feature::VersionPatch.in_version(revision) {
            b.put_uvarint(self.patch);
        }
        if Feature::OpenTelemetry.in_version(revision) {
            match &self.trace {
                Some(trace) => {
                    b.put_u8(1);
                    b.put_u128(trace.trace_id);
                    b.put_u64(trace.span_id);
                    b.put_string(&trace.trace_state);
                    b.put_u8(trace.trace_flags);
                }
                None => b.put_u8(0),
            }
        }
        if Feature::ParallelReplicas.in_version(revision) {
            b.put_uvarint(self.collaborate_with_initiator);
            b.put_uvarint(self.count_participating_replicas);
            b.put_uvarint(self.number_of_current_replica);
        }
    }

    pub fn decode_aware(&mut self, r: &mut Reader<'_>, revision: u64) -> Result<()> {
        self.kind = QueryKind::try_from(r.u8().context("query kind")? as u64)?;
        if self.kind == QueryKind::None {
            return Ok(());
        }

        self.initial_user = r.str().context("initial user")?;
        self.initial_query_id = r.str().context("initial query id")?;
        self.initial_address = r.str().context("initial address")?;
        if Feature::QueryStartTime.in_version(revision) {
            self.initial_start_time_us = r.u64().context("initial query start time")?;
        }

        self.interface = Interface::try_from(r.u8().context("interface")? as u64)?;
        match self.interface {
            Interface::Tcp => {
                self.os_user = r.str().context("os user")?;
                self.client_hostname = r.str().context("client hostname")?;
                self.client_name = r.str().context("client name")?;
                self.major = r.uvarint().context("major version")?;
                self.minor = r.uvarint().context("minor version")?;
                self.revision = r.uvarint().context("protocol revision")?;
            }
            Interface::Http => {
                self.http_method = r.u8().context("http method")?;
                self.http_user_agent = r.str().context("http user agent")?;
                if Feature::XForwardedForInClientInfo.in_version(revision) {
                    self.forwarded_for = r.str().context("forwarded for")?;
                }
                if Feature::RefererInClientInfo.in_version(revision) {
                    self.http_referer = r.str().context("http referer")?;
                }
            }
        }

        if Feature::QuotaKeyInClientInfo.in_version(revision) {
            self.quota_key = r.str().context("quota key")?;
        }
        if Feature::DistributedDepth.in_version(revision) {
            self.distributed_depth = r.uvarint().context("distributed depth")?;
        }
        if self.interface == Interface::Tcp && Feature::VersionPatch.in_version(revision) {
            self.patch = r.uvarint().context("version patch")?;
        }
        if Feature::OpenTelemetry.in_version(revision) {
            self.trace = match r.u8().context("trace present")? {
                0 => None,
                _ => Some(TraceContext {
                    trace_id: r.u128().context("trace id")?,
                    span_id: r.u64().context("span id")?,
                    trace_state: r.str().context("trace state")?,
                    trace_flags: r.u8().context("trace flags")?,
                }),
            };
        }
        if Feature::ParallelReplicas.in_version(revision) {
            self.collaborate_with_initiator = r.uvarint().context("collaborate with initiator")?;
            self.count_participating_replicas =
                r.uvarint().context("count participating replicas")?;
            self.number_of_current_replica = r.uvarint().context("number of current replica")?;
        }
        Ok(())
    }
}

const SETTING_IMPORTANT: u64 = 0x01;
const SETTING_CUSTOM: u64 = 0x02;

/// Named setting or parameter in string form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub important: bool,
    pub custom: bool,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

fn encode_settings(b: &mut Buffer, settings: &[Setting], revision: u64) {
    if Feature::SettingsSerializedAsStrings.in_version(revision) {
        for s in settings {
            let mut flags = 0;
            if s.important {
                flags |= SETTING_IMPORTANT;
            }
            if s.custom {
                flags |= SETTING_CUSTOM;
            }
            b.put_string(&s.key);
            b.put_uvarint(flags);
            b.put_string(&s.value);
        }
    }
    b.put_string("");
}

fn decode_settings(r: &mut Reader<'_>, revision: u64) -> Result<Vec<Setting>> {
    let mut settings = Vec::new();
    loop {
        let key = r.str().context("key")?;
        if key.is_empty() {
            return Ok(settings);
        }
        if !Feature::SettingsSerializedAsStrings.in_version(revision) {
            return Err(Error::NotImplemented(format!(
                "binary setting {key:?} at revision {revision}"
            )));
        }
        let flags = r.uvarint().with_context(|| format!("{key} flags"))?;
        let value = r.str().with_context(|| format!("{key} value"))?;
        settings.push(Setting {
            key,
            value,
            important: flags & SETTING_IMPORTANT != 0,
            custom: flags & SETTING_CUSTOM != 0,
        });
    }
}

/// Query submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub id: String,
    pub info: ClientInfo,
    pub settings: Vec<Setting>,
    pub secret: String,
    pub stage: Stage,
    pub compression: Compression,
    pub body: String,
    pub parameters: Vec<Setting>,
}

impl Query {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn encode_aware(&self, b: &mut Buffer, revision: u64) {
        ClientCode::Query.encode(b);
        b.put_string(&self.id);
        if Feature::ClientInfo.in_version(revision) {
            self.info.encode_aware(b, revision);
        }
        encode_settings(b, &self.settings, revision);
        if Feature::InterServerSecret.in_version(revision) {
            b.put_string(&self.secret);
        }
        b.put_uvarint(self.stage as u64);
        b.put_uvarint(self.compression as u64);
        b.put_string(&self.body);
        if Feature::Parameters.in_version(revision) {
            encode_settings(b, &self.parameters, revision);
        }
    }

    /// Decodes the payload following the packet code.
    pub fn decode_aware(r: &mut Reader<'_>, revision: u64) -> Result<Self> {
        let mut q = Query {
            id: r.str().context("query id")?,
            ..Default::default()
        };
        if Feature::ClientInfo.in_version(revision) {
            q.info.decode_aware(r, revision).context("client info")?;
        }
        q.settings = decode_settings(r, revision).context("settings")?;
        if Feature::InterServerSecret.in_version(revision) {
            q.secret = r.str().context("inter-server secret")?;
        }
        q.stage = Stage::try_from(r.uvarint().context("stage")?)?;
        q.compression = Compression::try_from(r.uvarint().context("compression")?)?;
        q.body = r.str().context("body")?;
        if Feature::Parameters.in_version(revision) {
            q.parameters = decode_settings(r, revision).context("parameters")?;
        }
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::proto::PROTOCOL_VERSION;

    fn decode(b: Buffer, revision: u64) -> Query {
        let mut r = Reader::new(Cursor::new(b.buf));
        assert_eq!(r.uvarint().unwrap(), ClientCode::Query as u64);
        let q = Query::decode_aware(&mut r, revision).unwrap();
        assert!(r.is_eof().unwrap());
        q
    }

    #[test]
    fn tcp_query_roundtrip() {
        let query = Query {
            id: "q-1".into(),
            info: ClientInfo {
                kind: QueryKind::Initial,
                initial_user: "default".into(),
                initial_query_id: "q-1".into(),
                initial_address: "127.0.0.1:9000".into(),
                initial_start_time_us: 1_700_000_000_000_000,
                client_name: "nativewire".into(),
                major: 1,
                minor: 2,
                revision: PROTOCOL_VERSION,
                patch: 3,
                quota_key: "quota".into(),
                trace: Some(TraceContext {
                    trace_id: 0xdead_beef,
                    span_id: 7,
                    trace_state: "s".into(),
                    trace_flags: 1,
                }),
                ..Default::default()
            },
            settings: vec![
                Setting::new("max_threads", "4"),
                Setting {
                    important: true,
                    ..Setting::new("max_block_size", "1024")
                },
            ],
            compression: Compression::Enabled,
            body: "SELECT 1".into(),
            ..Default::default()
        };

        let mut b = Buffer::new();
        query.encode_aware(&mut b, PROTOCOL_VERSION);
        assert_eq!(decode(b, PROTOCOL_VERSION), query);
    }

    #[test]
    fn http_client_info_roundtrip() {
        let query = Query {
            info: ClientInfo {
                kind: QueryKind::Secondary,
                interface: Interface::Http,
                http_method: 2,
                http_user_agent: "curl".into(),
                forwarded_for: "10.0.0.1".into(),
                http_referer: "ref".into(),
                ..Default::default()
            },
            ..Query::new("SELECT 2")
        };

        let mut b = Buffer::new();
        query.encode_aware(&mut b, PROTOCOL_VERSION);
        assert_eq!(decode(b, PROTOCOL_VERSION), query);
    }

    #[test]
    fn parameters_need_revision() {
        let query = Query {
            parameters: vec![Setting::new("x", "'1'")],
            ..Query::new("SELECT {x:UInt8}")
        };
        let revision = Feature::Parameters.version();

        let mut b = Buffer::new();
        query.encode_aware(&mut b, revision);
        assert_eq!(decode(b, revision), query);

        let mut b = Buffer::new();
        query.encode_aware(&mut b, PROTOCOL_VERSION);
        assert!(decode(b, PROTOCOL_VERSION).parameters.is_empty());
    }

    #[test]
    fn unknown_stage_rejected() {
        let mut b = Buffer::new();
        Query::new("SELECT 1").encode_aware(&mut b, PROTOCOL_VERSION);
        // Stage follows: id(1) kind(1) settings end(1) secret(1).
        b.buf[5] = 9;

        let mut r = Reader::new(Cursor::new(b.buf));
        r.uvarint().unwrap();
        let err = Query::decode_aware(&mut r, PROTOCOL_VERSION).unwrap_err();
        assert_eq!(err.to_string(), "invalid data: unknown Stage 9");
    }
}
