/* Copyright (C) 2022 Antmicro
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     https://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use thiserror::Error;

/// Failures while opening or decoding a chip database, netlist or record file.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("can't open file {path}: {source}")]
    CantOpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decompress {0}")]
    Decompress(String),
    #[error("failed to parse {path}: {msg}")]
    Parse { path: String, msg: String },
    #[error("inconsistent database: {0}")]
    Inconsistent(String),
}

/// Structural failures of the architecture core. Any of these aborts the flow.
#[derive(Debug, Error)]
pub enum ArchError {
    #[error("tile {tile} has no extra data, but {what} requires it")]
    MissingTileData { tile: u32, what: String },
    #[error("no low-skew path for net {net} to {sink}")]
    NoLowSkewPath { net: String, sink: String },
    #[error("unhandled cell {cell} of type {cell_type}")]
    UnknownCellType { cell: String, cell_type: String },
    #[error("unknown location {location} for {iobname}")]
    UnknownLocation { iobname: String, location: String },
    #[error("invalid option {key}={value}: {msg}")]
    InvalidOption { key: String, value: String, msg: String },
    #[error("invalid configuration record: {0}")]
    InvalidRecord(String),
    #[error("clock port {cell_type}.{port} registered in more than one tier")]
    ClockTierConflict { cell_type: String, port: String },
    #[error("unknown uarch {0}")]
    UnknownUarch(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ArchResult<T> = Result<T, ArchError>;
