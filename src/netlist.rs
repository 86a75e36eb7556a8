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

use std::collections::HashMap;
use std::path::Path;

use crate::chipdb::{read_plain_document, PinDir};
use crate::common::{BelId, PipId, WireId};
use crate::error::DbError;
use crate::strings::IdString;

/// Cell parameter value as produced by the packer. Bit vectors are strings of `0`/`1`,
/// MSB first.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Property {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl Property {
    pub fn as_string(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(*v as i64),
            /* A bit string is an integer too */
            Self::Str(s) if !s.is_empty() && s.chars().all(|c| c == '0' || c == '1') =>
                i64::from_str_radix(s, 2).ok(),
            Self::Str(s) => s.parse().ok(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Str(s) if s == "true" => Some(true),
            Self::Str(s) if s == "false" => Some(false),
            other => other.as_int().map(|v| v != 0),
        }
    }

    /// The lowest `bits` bits, LSB first (the order the configuration format expects).
    pub fn extract_bits_lsb_first(&self, bits: usize) -> String {
        let msb_first: String = match self {
            Self::Str(s) if s.chars().all(|c| c == '0' || c == '1') => s.clone(),
            other => format!("{:b}", other.as_int().unwrap_or(0)),
        };
        let lsb_first: Vec<char> = msb_first.chars().rev().collect();
        (0 .. bits)
            .map(|i| lsb_first.get(i).copied().unwrap_or('0'))
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortInfo {
    pub dir: PinDir,
    #[serde(default)]
    pub net: Option<IdString>,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PortRef {
    pub cell: IdString,
    pub port: IdString,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CellInfo {
    pub name: IdString,
    #[serde(rename = "type")]
    pub cell_type: IdString,
    #[serde(default)]
    pub ports: HashMap<IdString, PortInfo>,
    #[serde(default)]
    pub params: HashMap<IdString, Property>,
    #[serde(default)]
    pub bel: Option<BelId>,
    /// Location constraint coming from configuration records
    #[serde(default)]
    pub constr_bel: Option<BelId>,
    /// Name of the cluster root, which is also the cluster id
    #[serde(default)]
    pub cluster: Option<IdString>,
    #[serde(default)]
    pub constr_children: Vec<IdString>,
    #[serde(default)]
    pub constr_x: i32,
    #[serde(default)]
    pub constr_y: i32,
    #[serde(default)]
    pub constr_z: i32,
    #[serde(default)]
    pub constr_abs_z: bool,
}

impl CellInfo {
    pub fn new(name: IdString, cell_type: IdString) -> Self {
        Self {
            name,
            cell_type,
            ports: HashMap::new(),
            params: HashMap::new(),
            bel: None,
            constr_bel: None,
            cluster: None,
            constr_children: Vec::new(),
            constr_x: 0,
            constr_y: 0,
            constr_z: 0,
            constr_abs_z: false,
        }
    }

    pub fn port_net(&self, port: IdString) -> Option<IdString> {
        self.ports.get(&port).and_then(|p| p.net)
    }

    pub fn param(&self, key: &str) -> Option<&Property> {
        self.params.get(&IdString::new(key))
    }

    pub fn str_param_or(&self, key: &str, def: &str) -> String {
        match self.param(key) {
            Some(p) => p.as_string(),
            None => def.to_string(),
        }
    }

    pub fn int_param_or(&self, key: &str, def: i64) -> i64 {
        self.param(key).and_then(Property::as_int).unwrap_or(def)
    }

    pub fn bool_param_or(&self, key: &str, def: bool) -> bool {
        self.param(key).and_then(Property::as_bool).unwrap_or(def)
    }

    pub fn set_param(&mut self, key: &str, value: Property) {
        self.params.insert(IdString::new(key), value);
    }
}

/// Routing of a net: every bound wire with the pip driving it (`None` for the source).
#[derive(Clone, Debug, Default)]
pub struct NetInfo {
    pub name: IdString,
    pub driver: Option<PortRef>,
    pub users: Vec<PortRef>,
    pub wires: HashMap<WireId, Option<PipId>>,
}

#[derive(Deserialize)]
struct NetlistFile {
    cells: Vec<CellInfo>,
}

#[derive(Default)]
pub struct Netlist {
    pub cells: HashMap<IdString, CellInfo>,
    pub nets: HashMap<IdString, NetInfo>,
}

impl Netlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a packed netlist: a JSON/YAML document with a list of cells whose ports name
    /// the nets they connect to. Net connectivity is derived from port directions.
    pub fn load<P>(path: P) -> Result<Self, DbError> where P: AsRef<Path> {
        let file: NetlistFile = read_plain_document(path)?;
        Self::from_cells(file.cells)
    }

    pub fn from_cells(cells: Vec<CellInfo>) -> Result<Self, DbError> {
        let mut netlist = Self::new();
        for cell in cells {
            if netlist.cells.contains_key(&cell.name) {
                return Err(DbError::Inconsistent(format!("duplicate cell {}", cell.name)));
            }
            netlist.cells.insert(cell.name, cell);
        }
        netlist.rebuild_nets()?;
        Ok(netlist)
    }

    fn rebuild_nets(&mut self) -> Result<(), DbError> {
        self.nets.clear();
        /* Iterate in a fixed order so user lists are deterministic */
        let mut names: Vec<_> = self.cells.keys().copied().collect();
        names.sort();
        for name in names {
            let cell = &self.cells[&name];
            let mut ports: Vec<_> = cell.ports.iter().collect();
            ports.sort_by_key(|(p, _)| **p);
            for (port, info) in ports {
                let net_name = match info.net {
                    Some(net) => net,
                    None => continue,
                };
                let net = self.nets.entry(net_name).or_insert_with(|| NetInfo {
                    name: net_name,
                    ..Default::default()
                });
                let pref = PortRef { cell: name, port: *port };
                match info.dir {
                    PinDir::Output => {
                        if let Some(other) = net.driver {
                            return Err(DbError::Inconsistent(format!(
                                "net {} driven by both {}.{} and {}.{}",
                                net_name, other.cell, other.port, name, port
                            )));
                        }
                        net.driver = Some(pref);
                    },
                    PinDir::Input | PinDir::Inout => net.users.push(pref),
                }
            }
        }
        Ok(())
    }

    pub fn add_cell(&mut self, name: &str, cell_type: &str) -> &mut CellInfo {
        let name = IdString::new(name);
        self.cells.entry(name)
            .or_insert_with(|| CellInfo::new(name, IdString::new(cell_type)))
    }

    /// Connects `cell.port` to `net`, creating the net on first use.
    pub fn connect(&mut self, cell: &str, port: &str, dir: PinDir, net: &str) {
        let cell = IdString::new(cell);
        let port = IdString::new(port);
        let net_name = IdString::new(net);
        if let Some(c) = self.cells.get_mut(&cell) {
            c.ports.insert(port, PortInfo { dir, net: Some(net_name) });
        } else {
            return;
        }
        let net = self.nets.entry(net_name).or_insert_with(|| NetInfo {
            name: net_name,
            ..Default::default()
        });
        let pref = PortRef { cell, port };
        match dir {
            PinDir::Output => net.driver = Some(pref),
            _ => net.users.push(pref),
        }
    }

    pub fn cell(&self, name: IdString) -> Option<&CellInfo> {
        self.cells.get(&name)
    }

    pub fn net(&self, name: IdString) -> Option<&NetInfo> {
        self.nets.get(&name)
    }

    pub fn port_cell(&self, pref: &PortRef) -> Option<&CellInfo> {
        self.cells.get(&pref.cell)
    }

    /// Cells sorted by name, for deterministic iteration
    pub fn sorted_cells(&self) -> Vec<&CellInfo> {
        let mut cells: Vec<_> = self.cells.values().collect();
        cells.sort_by(|a, b| a.name.to_str().cmp(&b.name.to_str()));
        cells
    }

    /// Nets sorted by name, for deterministic iteration
    pub fn sorted_nets(&self) -> Vec<&NetInfo> {
        let mut nets: Vec<_> = self.nets.values().collect();
        nets.sort_by(|a, b| a.name.to_str().cmp(&b.name.to_str()));
        nets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_follows_port_direction() {
        let mut a = CellInfo::new(IdString::new("gck0"), IdString::new("GCK"));
        a.ports.insert(IdString::new("SO"), PortInfo { dir: PinDir::Output, net: Some(IdString::new("clk")) });
        let mut b = CellInfo::new(IdString::new("ff0"), IdString::new("BEYOND_FE"));
        b.ports.insert(IdString::new("CK"), PortInfo { dir: PinDir::Input, net: Some(IdString::new("clk")) });
        b.ports.insert(IdString::new("I1"), PortInfo { dir: PinDir::Input, net: None });

        let netlist = Netlist::from_cells(vec![a, b]).unwrap();
        let clk = netlist.net(IdString::new("clk")).unwrap();
        assert_eq!(clk.driver, Some(PortRef { cell: IdString::new("gck0"), port: IdString::new("SO") }));
        assert_eq!(clk.users, vec![PortRef { cell: IdString::new("ff0"), port: IdString::new("CK") }]);
        assert_eq!(netlist.nets.len(), 1);
    }

    #[test]
    fn test_two_drivers_are_rejected() {
        let mut cells = Vec::new();
        for name in ["a", "b"] {
            let mut c = CellInfo::new(IdString::new(name), IdString::new("BEYOND_FE"));
            c.ports.insert(IdString::new("LO"), PortInfo { dir: PinDir::Output, net: Some(IdString::new("n")) });
            cells.push(c);
        }
        assert!(Netlist::from_cells(cells).is_err());
    }

    #[test]
    fn test_property_conversions() {
        assert_eq!(Property::Str("1010".into()).as_int(), Some(10));
        assert_eq!(Property::Str("true".into()).as_bool(), Some(true));
        assert_eq!(Property::Int(0).as_bool(), Some(false));
        assert_eq!(Property::Str("0011".into()).extract_bits_lsb_first(6), "110000");
        assert_eq!(Property::Int(5).extract_bits_lsb_first(4), "1010");
    }
}
