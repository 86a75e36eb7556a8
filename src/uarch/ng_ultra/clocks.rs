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

use std::collections::{HashMap, HashSet};

use crate::chipdb::{Device, GckSources};
use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::netlist::PortRef;
use crate::strings::IdString;
use crate::uarch::GckSelect;
use super::NgUltra;
use super::constids::ID;
use super::tiles::TileTable;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SinkTier {
    Fabric,
    Ring,
    RingOverTile,
    Tube,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum SourceTier {
    Ring,
    Tube,
}

/// Where the clock feeding a GCK comes from.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DriverTier {
    Ring,
    Tube,
    Fabric,
}

type PortTable = HashMap<IdString, HashSet<IdString>>;

/// Clock port classification of the primitive library. A (cell type, port) pair is in at
/// most one sink tier and at most one source tier.
pub struct ClockTables {
    fabric_sinks: PortTable,
    ring_sinks: PortTable,
    ring_over_tile_sinks: PortTable,
    tube_sinks: PortTable,
    ring_sources: PortTable,
    tube_sources: PortTable,
}

fn has(table: &PortTable, cell_type: IdString, port: IdString) -> bool {
    table.get(&cell_type).map_or(false, |ports| ports.contains(&port))
}

fn conflict(cell_type: IdString, port: IdString) -> ArchError {
    ArchError::ClockTierConflict { cell_type: cell_type.to_str(), port: port.to_str() }
}

impl ClockTables {
    fn empty() -> Self {
        Self {
            fabric_sinks: PortTable::new(),
            ring_sinks: PortTable::new(),
            ring_over_tile_sinks: PortTable::new(),
            tube_sinks: PortTable::new(),
            ring_sources: PortTable::new(),
            tube_sources: PortTable::new(),
        }
    }

    pub fn from_entries(sinks: &[(SinkTier, &str, &[&str])], sources: &[(SourceTier, &str, &[&str])])
        -> ArchResult<Self>
    {
        let mut tables = Self::empty();
        for (tier, cell_type, ports) in sinks {
            for port in ports.iter() {
                tables.add_sink(*tier, IdString::new(cell_type), IdString::new(port))?;
            }
        }
        for (tier, cell_type, ports) in sources {
            for port in ports.iter() {
                tables.add_source(*tier, IdString::new(cell_type), IdString::new(port))?;
            }
        }
        Ok(tables)
    }

    pub fn add_sink(&mut self, tier: SinkTier, cell_type: IdString, port: IdString) -> ArchResult<()> {
        if let Some(existing) = self.sink_tier(cell_type, port) {
            if existing != tier {
                return Err(conflict(cell_type, port));
            }
            return Ok(());
        }
        let table = match tier {
            SinkTier::Fabric => &mut self.fabric_sinks,
            SinkTier::Ring => &mut self.ring_sinks,
            SinkTier::RingOverTile => &mut self.ring_over_tile_sinks,
            SinkTier::Tube => &mut self.tube_sinks,
        };
        table.entry(cell_type).or_default().insert(port);
        Ok(())
    }

    pub fn add_source(&mut self, tier: SourceTier, cell_type: IdString, port: IdString)
        -> ArchResult<()>
    {
        if let Some(existing) = self.source_tier(cell_type, port) {
            if existing != tier {
                return Err(conflict(cell_type, port));
            }
            return Ok(());
        }
        let table = match tier {
            SourceTier::Ring => &mut self.ring_sources,
            SourceTier::Tube => &mut self.tube_sources,
        };
        table.entry(cell_type).or_default().insert(port);
        Ok(())
    }

    pub fn sink_tier(&self, cell_type: IdString, port: IdString) -> Option<SinkTier> {
        if has(&self.fabric_sinks, cell_type, port) {
            Some(SinkTier::Fabric)
        } else if has(&self.ring_sinks, cell_type, port) {
            Some(SinkTier::Ring)
        } else if has(&self.ring_over_tile_sinks, cell_type, port) {
            Some(SinkTier::RingOverTile)
        } else if has(&self.tube_sinks, cell_type, port) {
            Some(SinkTier::Tube)
        } else {
            None
        }
    }

    pub fn source_tier(&self, cell_type: IdString, port: IdString) -> Option<SourceTier> {
        if has(&self.ring_sources, cell_type, port) {
            Some(SourceTier::Ring)
        } else if has(&self.tube_sources, cell_type, port) {
            Some(SourceTier::Tube)
        } else {
            None
        }
    }

    /// Clock topology of the NG-Ultra primitive library.
    pub fn ng_ultra() -> ArchResult<Self> {
        let mut tables = Self::empty();
        let sinks: &[(SinkTier, IdString, &[IdString])] = &[
            (SinkTier::Fabric, ID.BEYOND_FE, &[ID.CK]),
            (SinkTier::Fabric, ID.DFR, &[ID.CK]),
            (SinkTier::Fabric, ID.DDFR, &[ID.CK, ID.CKF]),
            (SinkTier::Fabric, ID.RF, &[ID.WCK]),
            (SinkTier::Fabric, ID.RFSP, &[ID.WCK]),
            (SinkTier::Fabric, ID.XHRF, &[ID.WCK]),
            (SinkTier::Fabric, ID.XWRF, &[ID.WCK]),
            (SinkTier::Fabric, ID.XPRF, &[ID.WCK]),
            (SinkTier::Fabric, ID.RAM, &[ID.ACK, ID.BCK]),
            (SinkTier::Fabric, ID.DSP, &[ID.CK]),
            (SinkTier::Fabric, ID.FIFO, &[ID.RCK, ID.WCK]),
            (SinkTier::Fabric, ID.XHFIFO, &[ID.RCK, ID.WCK]),
            (SinkTier::Fabric, ID.XWFIFO, &[ID.RCK, ID.WCK]),
            (SinkTier::Fabric, ID.DDE, &[ID.CK1, ID.CK2]),
            (SinkTier::Fabric, ID.TDE, &[ID.CK1, ID.CK2]),
            (SinkTier::Fabric, ID.CDC, &[ID.CK1, ID.CK2]),
            (SinkTier::Fabric, ID.XCDC, &[ID.CK1, ID.CK2]),
            (SinkTier::Ring, ID.GCK, &[ID.SI1, ID.SI2]),
            (SinkTier::Ring, ID.WFB, &[ID.ZI]),
            (SinkTier::Ring, ID.WFG, &[ID.ZI]),
            (SinkTier::Ring, ID.PLL, &[ID.REF, ID.FBK]),
            (SinkTier::RingOverTile, ID.IOM, &[ID.FCK1, ID.FCK2]),
            (SinkTier::Tube, ID.GCK, &[ID.CMD]),
        ];
        let sources: &[(SourceTier, IdString, &[IdString])] = &[
            (SourceTier::Ring, ID.IOM, &[ID.CKO1, ID.CKO2]),
            (SourceTier::Ring, ID.WFB, &[ID.ZO]),
            (SourceTier::Ring, ID.WFG, &[ID.ZO]),
            (SourceTier::Ring, ID.PLL, &[
                ID.CLK_O, ID.CLK_DIV1, ID.CLK_DIV2, ID.CLK_DIV3, ID.CLK_DIV4,
                ID.CLK_DIVD1, ID.CLK_DIVD2, ID.CLK_DIVD3, ID.CLK_DIVD4, ID.CLK_DIVD5,
                ID.CLK_CAL, ID.CLK_CAL_DIV, ID.OSC,
            ]),
            (SourceTier::Tube, ID.GCK, &[ID.SO]),
        ];
        for (tier, cell_type, ports) in sinks {
            for port in ports.iter() {
                tables.add_sink(*tier, *cell_type, *port)?;
            }
        }
        for (tier, cell_type, ports) in sources {
            for port in ports.iter() {
                tables.add_source(*tier, *cell_type, *port)?;
            }
        }
        Ok(tables)
    }
}

/// One global clock buffer of a lobe and the clock origins it can take.
#[derive(Clone, Debug)]
pub struct GckConfig {
    pub bel: BelId,
    pub sources: GckSources,
}

impl GckConfig {
    pub fn accepts(&self, tier: DriverTier) -> bool {
        match tier {
            DriverTier::Ring => self.sources.ring,
            DriverTier::Tube => self.sources.tube,
            DriverTier::Fabric => self.sources.fabric,
        }
    }
}

/// A clock net competing for the GCKs of a lobe.
#[derive(Clone, Debug)]
pub struct ClockRequest {
    pub net: IdString,
    pub tier: DriverTier,
    pub driver: Option<Loc>,
}

/// Gives every request its own config, in request order. Returns the chosen config index
/// per request, or `None` if some request can't be served.
pub fn assign_gcks(dev: &Device, configs: &[GckConfig], requests: &[ClockRequest], policy: GckSelect)
    -> Option<Vec<usize>>
{
    let mut used = vec![false; configs.len()];
    let mut assignment = Vec::with_capacity(requests.len());
    for req in requests {
        let free = configs.iter().enumerate()
            .filter(|(idx, cfg)| !used[*idx] && cfg.accepts(req.tier));
        let chosen = match (policy, req.driver) {
            (GckSelect::Nearest, Some(driver)) => free
                .min_by_key(|(idx, cfg)| (dev.bel_location(cfg.bel).manhattan(&driver), *idx))
                .map(|(idx, _)| idx),
            _ => free.map(|(idx, _)| idx).next(),
        }?;
        used[chosen] = true;
        assignment.push(chosen);
    }
    Some(assignment)
}

/// GCK bels grouped by lobe, in tile then z order.
pub fn build_gck_per_lobe(dev: &Device, tiles: &TileTable) -> ArchResult<HashMap<u32, Vec<GckConfig>>> {
    let mut gcks: Vec<_> = dev.bels().filter(|bel| dev.bel_type(*bel) == ID.GCK).collect();
    gcks.sort_by_key(|bel| (bel.tile, dev.bel_data(*bel).z));

    let mut per_lobe: HashMap<u32, Vec<GckConfig>> = HashMap::new();
    for bel in gcks {
        let lobe = tiles.lobe(bel.tile).ok_or_else(|| ArchError::MissingTileData {
            tile: bel.tile,
            what: format!("GCK {}", dev.bel_name(bel)),
        })?;
        let sources = dev.bel_data(bel).extra.as_ref()
            .and_then(|e| e.gck_sources.clone())
            .unwrap_or_else(GckSources::any);
        per_lobe.entry(lobe).or_default().push(GckConfig { bel, sources });
    }
    Ok(per_lobe)
}

impl NgUltra {
    fn port_sink_tier(&self, ctx: &Context, pref: &PortRef) -> Option<SinkTier> {
        let cell = ctx.cell(pref.cell)?;
        self.clocks.sink_tier(cell.cell_type, pref.port)
    }

    fn port_source_tier(&self, ctx: &Context, pref: &PortRef) -> Option<SourceTier> {
        let cell = ctx.cell(pref.cell)?;
        self.clocks.source_tier(cell.cell_type, pref.port)
    }

    pub fn is_fabric_clock_sink(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_sink_tier(ctx, pref) == Some(SinkTier::Fabric)
    }

    pub fn is_ring_clock_sink(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_sink_tier(ctx, pref) == Some(SinkTier::Ring)
    }

    pub fn is_ring_over_tile_clock_sink(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_sink_tier(ctx, pref) == Some(SinkTier::RingOverTile)
    }

    pub fn is_tube_clock_sink(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_sink_tier(ctx, pref) == Some(SinkTier::Tube)
    }

    pub fn is_ring_clock_source(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_source_tier(ctx, pref) == Some(SourceTier::Ring)
    }

    pub fn is_tube_clock_source(&self, ctx: &Context, pref: &PortRef) -> bool {
        self.port_source_tier(ctx, pref) == Some(SourceTier::Tube)
    }

    /// Sinks that can only be reached over the dedicated low-skew network.
    pub fn is_lowskew_sink(&self, ctx: &Context, pref: &PortRef) -> bool {
        matches!(
            self.port_sink_tier(ctx, pref),
            Some(SinkTier::Ring) | Some(SinkTier::RingOverTile) | Some(SinkTier::Tube)
        )
    }

    /// Ring or tube origin of a net's driver. Pads on global-capable bels feed the ring.
    pub fn driver_tier(&self, ctx: &Context, driver: &PortRef) -> DriverTier {
        match self.port_source_tier(ctx, driver) {
            Some(SourceTier::Ring) => return DriverTier::Ring,
            Some(SourceTier::Tube) => return DriverTier::Tube,
            None => (),
        }
        let on_global_pad = ctx.cell(driver.cell)
            .and_then(|c| c.bel)
            .and_then(|bel| self.global_capable_bels.get(&bel))
            .map_or(false, |pin| *pin == driver.port);
        if on_global_pad {
            DriverTier::Ring
        } else {
            DriverTier::Fabric
        }
    }
}
