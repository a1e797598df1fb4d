//! DNS record vocabulary.
//!
//! The dispatcher does not parse wire-format records; these types are the
//! minimal vocabulary it needs to describe questions and carry the answers
//! an executor hands back.

use std::fmt::{self, Display};

/// DNS record types a query can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Ptr,
    Soa,
    Srv,
    Txt,
    Any,
}

impl Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Ns => "NS",
            Self::Ptr => "PTR",
            Self::Soa => "SOA",
            Self::Srv => "SRV",
            Self::Txt => "TXT",
            Self::Any => "ANY",
        })
    }
}

/// One question section entry of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// The queried name.
    pub name: String,
    /// The queried record type.
    pub record_type: RecordType,
}

impl Question {
    /// Creates a question for `name` and `record_type`.
    pub fn new(name: impl ToString, record_type: RecordType) -> Self {
        Self {
            name: name.to_string(),
            record_type,
        }
    }
}

impl Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type)
    }
}

/// One answer record as reported by an executor.
///
/// The record data is kept in presentation format; typed parsing belongs to
/// the executor layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// The owner name of the record.
    pub name: String,
    /// The record type.
    pub record_type: RecordType,
    /// Remaining time to live, in seconds.
    pub ttl: u32,
    /// The record data in presentation format.
    pub data: String,
}

impl Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.name, self.ttl, self.record_type, self.data
        )
    }
}
