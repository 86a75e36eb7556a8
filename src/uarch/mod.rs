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
use std::str::FromStr;

use crate::common::*;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::strings::IdString;

pub mod ng_ultra;

/// Hooks the generic place-and-route flow calls into. Queries are read-only; anything
/// changing architecture state takes `&mut self`.
pub trait Uarch {
    fn name(&self) -> &'static str;

    /// Builds every derived table. Must run once, after the netlist is loaded and before
    /// any query.
    fn init(&mut self, ctx: &Context) -> ArchResult<()>;

    fn is_bel_location_valid(&self, ctx: &Context, bel: BelId, explain_invalid: bool) -> bool;

    fn get_bel_bucket_for_cell_type(&self, cell_type: IdString) -> IdString;

    fn is_valid_bel_for_cell_type(&self, ctx: &Context, cell_type: IdString, bel: BelId) -> bool;

    fn get_cluster_placement(&self, ctx: &Context, cluster: IdString, root_bel: BelId)
        -> Option<Vec<(IdString, BelId)>>;

    fn check_pip_avail(&self, pip: PipId) -> bool;

    fn check_pip_avail_for_net(&self, pip: PipId, _net: IdString) -> bool {
        self.check_pip_avail(pip)
    }

    fn get_route_bounding_box(&self, ctx: &Context, src: WireId, dst: WireId) -> BoundingBox;

    fn estimate_delay(&self, ctx: &Context, src: WireId, dst: WireId) -> Delay;

    fn predict_delay(&self, ctx: &Context, src_bel: BelId, src_pin: IdString,
                     dst_bel: BelId, dst_pin: IdString) -> Delay;

    fn notify_bel_change(&mut self, _ctx: &Context, _bel: BelId, _cell: IdString, _bound: bool) {}

    /// Binds through the context and keeps the architecture's occupancy state in sync.
    fn bind_bel(&mut self, ctx: &mut Context, bel: BelId, cell: IdString) -> bool {
        if let Some(old) = ctx.cell(cell).and_then(|c| c.bel) {
            if !ctx.check_bel_avail(bel) {
                return false;
            }
            self.notify_bel_change(ctx, old, cell, false);
        }
        if !ctx.bind_bel(bel, cell) {
            return false;
        }
        self.notify_bel_change(ctx, bel, cell, true);
        true
    }

    fn unbind_bel(&mut self, ctx: &mut Context, bel: BelId) -> Option<IdString> {
        let cell = ctx.bound_bel_cell(bel)?.name;
        self.notify_bel_change(ctx, bel, cell, false);
        ctx.unbind_bel(bel)
    }

    /// Applies a file of I/O and bank configuration records.
    fn load_config_records(&mut self, _ctx: &mut Context, _path: &Path) -> ArchResult<()> {
        Ok(())
    }

    /// Dedicated routing that has to happen before the general router runs.
    fn pre_route(&mut self, _ctx: &mut Context) -> ArchResult<()> {
        Ok(())
    }

    fn write_bitstream(&self, ctx: &Context, path: &Path) -> ArchResult<()>;
}

/// Which GCK of a lobe serves a clock net.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GckSelect {
    /// First free config in lobe order
    FirstFit,
    /// Free config closest to the net's driver
    Nearest,
}

impl FromStr for GckSelect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-fit" | "first_fit" | "firstfit" => Ok(Self::FirstFit),
            "nearest" => Ok(Self::Nearest),
            _ => Err("expected `first-fit` or `nearest`".to_string()),
        }
    }
}

/// Raw `KEY=VALUE` architecture options, as passed with `-o` on the command line.
#[derive(Clone, Debug, Default)]
pub struct ArchArgs {
    options: HashMap<String, String>,
}

impl ArchArgs {
    pub fn from_options<I, S>(options: I) -> ArchResult<Self> where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = Self::default();
        for opt in options {
            let opt = opt.as_ref();
            let (key, value) = match opt.split_once('=') {
                Some((k, v)) if !k.is_empty() => (k.trim(), v.trim()),
                /* A bare key is a flag */
                None if !opt.is_empty() => (opt.trim(), "1"),
                _ => return Err(ArchError::InvalidOption {
                    key: opt.to_string(),
                    value: String::new(),
                    msg: "expected KEY=VALUE".into(),
                }),
            };
            args.options.insert(key.to_string(), value.to_string());
        }
        Ok(args)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|v| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(|k| k.as_str())
    }

    /// Typed value of `key`, `def` when it is absent.
    pub fn parse_or<T>(&self, key: &str, def: T) -> ArchResult<T> where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.options.get(key) {
            Some(value) => value.parse().map_err(|e: T::Err| ArchError::InvalidOption {
                key: key.to_string(),
                value: value.clone(),
                msg: e.to_string(),
            }),
            None => Ok(def),
        }
    }

    pub fn flag_or(&self, key: &str, def: bool) -> ArchResult<bool> {
        match self.options.get(key).map(|v| v.as_str()) {
            Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
            Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
            Some(other) => Err(ArchError::InvalidOption {
                key: key.to_string(),
                value: other.to_string(),
                msg: "expected a boolean".into(),
            }),
            None => Ok(def),
        }
    }
}

pub type UarchCtor = fn(&ArchArgs) -> ArchResult<Box<dyn Uarch>>;

/// Explicit table of known architectures. The driver builds it; nothing registers itself.
#[derive(Default)]
pub struct ArchRegistry {
    entries: Vec<(&'static str, UarchCtor)>,
}

impl ArchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &'static str, ctor: UarchCtor) -> Self {
        self.entries.push((name, ctor));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }

    pub fn create(&self, name: &str, args: &ArchArgs) -> ArchResult<Box<dyn Uarch>> {
        match self.entries.iter().find(|(n, _)| *n == name) {
            Some((_, ctor)) => ctor(args),
            None => Err(ArchError::UnknownUarch(name.to_string())),
        }
    }
}
