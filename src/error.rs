//! Process-level error type: startup/configuration failures. Per-packet
//! outcomes never surface through this type — malformed or unroutable
//! traffic is dropped (and, where applicable, answered with an ICMP
//! error) deep inside the pipeline, never propagated as a `Result`.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed interface line: {0:?}")]
    BadInterfaceLine(String),

    #[error("malformed routing-table line: {0:?}")]
    BadRoutingLine(String),

    #[error("duplicate interface name: {0}")]
    DuplicateInterfaceName(String),

    #[error("unknown interface referenced: {0}")]
    UnknownInterface(String),
}
