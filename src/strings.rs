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
use std::sync::{Mutex, RwLock, RwLockReadGuard};
use std::borrow::Borrow;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

lazy_static!{
    /* Id 0 is reserved for the empty string */
    static ref GLOBAL_STRINGS: RwLock<Vec<String>> = RwLock::new(vec![String::new()]);
    static ref GLOBAL_STRINGS_REVMAP: Mutex<HashMap<String, u32>> =
        Mutex::new([(String::new(), 0)].into_iter().collect());
}

/// Interned identifier used for cell types, port names, bel types and instance names.
/// Comparing and hashing an `IdString` never touches the string table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct IdString(u32);

pub struct GlobalStringsCtx();

/* We need some sort of an "object" to mark the scope in which we hold the reference
 * to a string. See the `'s` lifetime in `Self::get_global_string` */
impl GlobalStringsCtx {
    pub fn hold() -> Self {
        Self()
    }

    /// Get a global identifier for a provided string. Creates a new identifier if the
    /// string was not registered. Returns an existing identifier if the string has been
    /// already registered.
    pub fn create_global_string<S>(&mut self, s: S) -> IdString where
        S: ToString + Borrow<str>
    {
        /* Use &mut self reference to statically prevent deadlocking with
         * `Self::get_global_string` */

        /* The revmap lock is taken first so that two threads registering the same
         * string can't both miss the lookup and push a duplicate */
        let mut revmap = GLOBAL_STRINGS_REVMAP.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(id) = revmap.get(s.borrow()) {
            return IdString(*id);
        }

        let mut strings = GLOBAL_STRINGS.write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let id = strings.len() as u32;

        let s = s.to_string();
        revmap.insert(s.clone(), id);
        strings.push(s);

        IdString(id)
    }

    pub fn get_global_string<'s>(&'s self, id: IdString) -> GlobalStringRef<'s> {
        GlobalStringRef {
            guard: GLOBAL_STRINGS.read().unwrap_or_else(|poisoned| poisoned.into_inner()),
            idx: id.0 as usize,
        }
    }
}

impl IdString {
    pub const EMPTY: IdString = IdString(0);

    /// Shorthand for registering a string outside of any held context.
    pub fn new(s: &str) -> Self {
        GlobalStringsCtx::hold().create_global_string(s)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    pub fn get<'s>(&self, gsctx: &'s GlobalStringsCtx) -> GlobalStringRef<'s> {
        gsctx.get_global_string(*self)
    }

    /// Owned copy of the string. Releases the table lock before returning.
    pub fn to_str(&self) -> String {
        let gsctx = GlobalStringsCtx::hold();
        let s = self.get(&gsctx).to_string();
        s
    }

    pub fn in_list(&self, list: &[IdString]) -> bool {
        list.contains(self)
    }
}

impl std::fmt::Display for IdString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let gsctx = GlobalStringsCtx::hold();
        let r = self.get(&gsctx);
        f.write_str(&r)
    }
}

impl From<&str> for IdString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for IdString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where
        S: Serializer
    {
        let gsctx = GlobalStringsCtx::hold();
        let r = self.get(&gsctx);
        serializer.serialize_str(&r)
    }
}

impl<'de> Deserialize<'de> for IdString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where
        D: Deserializer<'de>
    {
        let s = String::deserialize(deserializer)?;
        Ok(IdString::new(&s))
    }
}

pub struct GlobalStringRef<'l> {
    guard: RwLockReadGuard<'l, Vec<String>>,
    idx: usize,
}

impl<'l> std::ops::Deref for GlobalStringRef<'l> {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.guard[self.idx]
    }
}

impl<'l> Borrow<str> for GlobalStringRef<'l> {
    fn borrow(&self) -> &str {
        &self.guard[self.idx]
    }
}

impl<'l> std::fmt::Debug for GlobalStringRef<'l> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GlobalStringRef({})", self.guard[self.idx])
    }
}

impl<'l> std::fmt::Display for GlobalStringRef<'l> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.guard[self.idx].fmt(f)
    }
}

impl<'l> std::cmp::PartialEq for GlobalStringRef<'l> {
    fn eq(&self, other: &Self) -> bool {
        self.idx.eq(&other.idx)
    }
}

impl<'l> std::cmp::Eq for GlobalStringRef<'l> {}

/// Builds an `IdString` from a format string, like nextpnr's `idf`.
#[macro_export]
macro_rules! idf {
    ($($arg:tt)*) => {
        $crate::strings::IdString::new(&format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let a = IdString::new("TUBE_BUFFER");
        let b = IdString::new("TUBE_BUFFER");
        let c = IdString::new("CLK");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_str(), "TUBE_BUFFER");
        assert_eq!(format!("{}", c), "CLK");
    }

    #[test]
    fn test_empty_string_is_reserved() {
        assert!(IdString::new("").is_empty());
        assert_eq!(IdString::default(), IdString::EMPTY);
        assert_eq!(idf!("CKO{}", 1), IdString::new("CKO1"));
    }
}
