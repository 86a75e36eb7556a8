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

use std::path::Path;
use std::fs::File;
use std::io::BufReader;
use memmap2::Mmap;
use flate2::read::GzDecoder;

use crate::error::DbError;
use crate::strings::IdString;

pub mod device;
#[cfg(test)]
pub mod testutil;

pub use device::Device;

pub const BEL_FLAG_GLOBAL: u32 = 0x01;
pub const BEL_FLAG_HIDDEN: u32 = 0x02;

/// Wire belongs to a dedicated low-skew clock network (ring, tube or GCK spine).
pub const WIRE_FLAG_LOWSKEW: u32 = 0x01;

#[derive(Copy, Clone, Hash, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PinDir {
    Inout,
    Input,
    Output,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BelPin {
    pub name: IdString,
    pub wire: u32,
    pub dir: PinDir,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GckSources {
    #[serde(default = "yes")]
    pub ring: bool,
    #[serde(default = "yes")]
    pub tube: bool,
    #[serde(default = "yes")]
    pub fabric: bool,
}

fn yes() -> bool {
    true
}

impl GckSources {
    pub fn any() -> Self {
        Self { ring: true, tube: true, fabric: true }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BelExtra {
    /// Index into the tile type's `mux_groups`
    #[serde(default)]
    pub mux_group: Option<u32>,
    /// Only meaningful for GCK bels
    #[serde(default)]
    pub gck_sources: Option<GckSources>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BelData {
    pub name: IdString,
    pub bel_type: IdString,
    pub z: i32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub pins: Vec<BelPin>,
    #[serde(default)]
    pub extra: Option<BelExtra>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileWireData {
    pub name: IdString,
    #[serde(default)]
    pub wire_type: IdString,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PipExtraKind {
    Normal,
    Mux,
    Bypass,
    Virtual,
    Interconnect,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipExtra {
    #[serde(default)]
    pub name: IdString,
    /// Mux input selected when this pip is used
    #[serde(default)]
    pub input: u8,
    pub kind: PipExtraKind,
    /// Bel (index in the tile type) this pip routes through
    #[serde(default)]
    pub bel: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipData {
    pub src_wire: u32,
    pub dst_wire: u32,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub extra: Option<PipExtra>,
}

/// Bels sharing a set of statically configured input muxes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MuxGroup {
    pub bels: Vec<u32>,
    pub ports: Vec<IdString>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileTypeData {
    pub name: IdString,
    #[serde(default)]
    pub bels: Vec<BelData>,
    #[serde(default)]
    pub wires: Vec<TileWireData>,
    #[serde(default)]
    pub pips: Vec<PipData>,
    #[serde(default)]
    pub mux_groups: Vec<MuxGroup>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileExtra {
    pub name: String,
    #[serde(default)]
    pub lobe: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileInstData {
    pub type_idx: u32,
    #[serde(default)]
    pub extra: Option<TileExtra>,
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct NodeWireRef {
    pub tile: u32,
    pub index: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BankCkg {
    pub bank: IdString,
    pub source_tile: IdString,
    pub ckg_tile: IdString,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChipExtra {
    #[serde(default)]
    pub bank_ckg: Vec<BankCkg>,
}

/// The deserialized chip database. Tiles are stored row-major, `width * height` of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChipDb {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tile_types: Vec<TileTypeData>,
    pub tiles: Vec<TileInstData>,
    /// Tile wires joined into one electrical wire. The first member is canonical.
    #[serde(default)]
    pub nodes: Vec<Vec<NodeWireRef>>,
    #[serde(default)]
    pub extra: ChipExtra,
}

pub struct OpenOpts {
    pub raw: bool,
}

impl Default for OpenOpts {
    fn default() -> Self {
        Self {
            raw: false
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    let name = path.to_string_lossy();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    name.ends_with(".yaml") || name.ends_with(".yml")
}

fn parse_error<E: std::fmt::Display>(path: &Path, e: E) -> DbError {
    DbError::Parse { path: path.to_string_lossy().to_string(), msg: e.to_string() }
}

/// Reads any serde-described document the way chip databases are stored: gzipped JSON
/// by default, raw (memory-mapped) when `opts.raw` is set, YAML for `.yaml`/`.yml` names.
pub fn read_document<T, P>(path: P, opts: &OpenOpts) -> Result<T, DbError> where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|source| DbError::CantOpenFile {
            path: path.to_string_lossy().to_string(),
            source
        })?;
    let yaml = is_yaml(path);

    /* RAW mode uses memory mapping and is much faster for debug builds.
     * For the gzipped default the file is streamed through the decoder. */
    if opts.raw {
        /* UNSAFE DUE TO A POTENTIAL UB WHEN A FILE IS CHANGED! */
        let mmapped = unsafe { Mmap::map(&file) }
            .map_err(|source| DbError::CantOpenFile {
                path: path.to_string_lossy().to_string(),
                source
            })?;
        if yaml {
            serde_yaml::from_slice(&mmapped[..]).map_err(|e| parse_error(path, e))
        } else {
            serde_json::from_slice(&mmapped[..]).map_err(|e| parse_error(path, e))
        }
    } else {
        let d = BufReader::new(GzDecoder::new(file));
        let res = if yaml {
            serde_yaml::from_reader(d).map_err(|e| parse_error(path, e))
        } else {
            serde_json::from_reader(d).map_err(|e| parse_error(path, e))
        };
        /* A non-gzip input shows up as a parse failure on an empty stream, report it
         * as such */
        res.map_err(|e| match e {
            DbError::Parse { path, msg } if msg.contains("invalid gzip header") =>
                DbError::Decompress(path),
            other => other,
        })
    }
}

/// Reads a plain (uncompressed) JSON or YAML document without mapping it.
pub fn read_plain_document<T, P>(path: P) -> Result<T, DbError> where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|source| DbError::CantOpenFile {
            path: path.to_string_lossy().to_string(),
            source
        })?;
    let r = BufReader::new(file);
    if is_yaml(path) {
        serde_yaml::from_reader(r).map_err(|e| parse_error(path, e))
    } else {
        serde_json::from_reader(r).map_err(|e| parse_error(path, e))
    }
}

pub fn open<P>(path: P, opts: OpenOpts) -> Result<ChipDb, DbError> where
    P: AsRef<Path>,
{
    let db: ChipDb = read_document(path, &opts)?;
    device::check_grid(&db)?;
    Ok(db)
}
