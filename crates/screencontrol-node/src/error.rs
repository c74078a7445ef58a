// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("GUI bridge not available: {0}")]
    BridgeUnavailable(String),
}
