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

use std::collections::HashSet;
use std::path::Path;

use crate::chipdb::read_plain_document;
use crate::context::Context;
use crate::error::{ArchError, ArchResult};
use crate::netlist::Property;
use crate::strings::IdString;
use super::NgUltra;
use super::constids::io_family;
use super::legality::parse_voltage;

pub const BANK_VOLTAGES: &[&str] = &["1.2V", "1.5V", "1.8V", "2.5V", "3.3V"];

const STANDARDS: &[&str] = &["LVDS", "LVCMOS", "SSTL", "HSSTL", "HSTL"];
const DRIVES: &[&str] = &["2mA", "4mA", "8mA", "16mA", "CatI", "CatII", "CatIII", "CatIV", "Undefined"];
const SLEW_RATES: &[&str] = &["Slow", "Medium", "Fast"];

/// One line of the I/O constraint file, already tokenized.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigRecord {
    BankVoltage {
        bank: String,
        voltage: String,
    },
    IoLocation {
        iobname: String,
        location: String,
        #[serde(default)]
        standard: Option<String>,
        #[serde(default)]
        drive: Option<String>,
        #[serde(default)]
        slew_rate: Option<String>,
        #[serde(default)]
        termination: Option<String>,
        #[serde(default)]
        weak_termination: Option<String>,
        #[serde(default)]
        input_delay_line: Option<String>,
        #[serde(default)]
        output_delay_line: Option<String>,
        #[serde(default)]
        differential: Option<bool>,
    },
}

fn check_choice(what: &str, value: &str, allowed: &[&str], prefix: bool) -> ArchResult<()> {
    let ok = allowed.iter().any(|a| if prefix { value.starts_with(a) } else { value == *a });
    if ok {
        Ok(())
    } else {
        Err(ArchError::InvalidRecord(format!(
            "{} `{}` is not one of {}", what, value, allowed.join(", ")
        )))
    }
}

pub fn load_records<P>(path: P) -> ArchResult<Vec<ConfigRecord>> where P: AsRef<Path> {
    Ok(read_plain_document(path)?)
}

impl NgUltra {
    pub fn apply_records(&mut self, ctx: &mut Context, records: &[ConfigRecord]) -> ArchResult<()> {
        let mut claimed = HashSet::new();
        for record in records {
            match record {
                ConfigRecord::BankVoltage { bank, voltage } => self.apply_bank_voltage(bank, voltage)?,
                ConfigRecord::IoLocation { iobname, location, .. } => {
                    if !claimed.insert(location.clone()) {
                        return Err(ArchError::InvalidRecord(format!(
                            "location {} is assigned twice", location
                        )));
                    }
                    self.apply_io_location(ctx, iobname, location, record)?;
                }
            }
        }
        Ok(())
    }

    fn apply_bank_voltage(&mut self, bank: &str, voltage: &str) -> ArchResult<()> {
        if !self.io_banks.contains(bank) {
            return Err(ArchError::InvalidRecord(format!("unknown bank {}", bank)));
        }
        let normalized = parse_voltage(voltage).unwrap_or_else(|| voltage.to_string());
        check_choice("voltage", &normalized, BANK_VOLTAGES, false)?;
        self.bank_voltage.insert(bank.to_string(), normalized);
        Ok(())
    }

    fn apply_io_location(&mut self, ctx: &mut Context, iobname: &str, location: &str,
                         record: &ConfigRecord) -> ArchResult<()>
    {
        let bel = *self.locations.get(location).ok_or_else(|| ArchError::UnknownLocation {
            iobname: iobname.to_string(),
            location: location.to_string(),
        })?;

        let mut params: Vec<(&str, Property)> = vec![("location", Property::Str(location.to_string()))];
        if let ConfigRecord::IoLocation {
            standard, drive, slew_rate, termination, weak_termination,
            input_delay_line, output_delay_line, differential, ..
        } = record {
            if let Some(standard) = standard {
                check_choice("standard", standard, STANDARDS, true)?;
                params.push(("standard", Property::Str(standard.clone())));
            }
            if let Some(drive) = drive {
                check_choice("drive", drive, DRIVES, false)?;
                params.push(("drive", Property::Str(drive.clone())));
            }
            if let Some(slew_rate) = slew_rate {
                check_choice("slew rate", slew_rate, SLEW_RATES, false)?;
                params.push(("slewRate", Property::Str(slew_rate.clone())));
            }
            let optional = [
                ("termination", termination),
                ("weakTermination", weak_termination),
                ("inputDelayLine", input_delay_line),
                ("outputDelayLine", output_delay_line),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    params.push((key, Property::Str(value.clone())));
                }
            }
            if let Some(differential) = differential {
                params.push(("differential", Property::Bool(*differential)));
            }
        }

        let io_types = io_family();
        let iobname_id = IdString::new("iobname");
        let targets: Vec<_> = ctx.netlist.cells.values()
            .filter(|c| c.cell_type.in_list(&io_types))
            .filter(|c| c.params.get(&iobname_id).map_or(false, |p| p.as_string() == iobname))
            .map(|c| c.name)
            .collect();
        if targets.is_empty() {
            log_warn!("no I/O named {} in the design, ignoring its location {}", iobname, location);
            return Ok(());
        }
        for name in targets {
            if let Some(cell) = ctx.netlist.cells.get_mut(&name) {
                for (key, value) in &params {
                    cell.set_param(key, value.clone());
                }
                cell.constr_bel = Some(bel);
            }
        }
        Ok(())
    }

    pub(super) fn load_records_file(&mut self, ctx: &mut Context, path: &Path) -> ArchResult<()> {
        let records = load_records(path)?;
        log_info!("Applying {} configuration records from {}", records.len(), path.display());
        self.apply_records(ctx, &records)
    }
}
