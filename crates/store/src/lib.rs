// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Stored prints.
//!
//! A stored print is a labeled collection of one or more template payloads sharing the same
//! driver id and device type. Its wire format (FP2) is a small packed little-endian header
//! followed by length-prefixed entries; the legacy FP1 magic is still accepted for read, with
//! the whole body taken as a single entry.

use fprint_error::{Code, Error};
use num_enum::{IntoPrimitive, TryFromPrimitive};

mod disk;

pub use disk::{DiscoveredPrint, PrintStore};

/// Magic prefix of the current wire format.
pub const FP2_MAGIC: &[u8; 3] = b"FP2";

/// Magic prefix of the legacy wire format.
pub const FP1_MAGIC: &[u8; 3] = b"FP1";

/// Byte length of the wire header: magic, driver id, device type, data type.
const HEADER_LEN: usize = 3 + 2 + 4 + 1;

/// Kind of payload a stored print carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PrintDataType {
    /// Driver-defined opaque payload.
    Raw = 0,

    /// Minutiae template payloads.
    Minutiae = 1,
}

/// One of the ten human fingers. Value 0x0 is reserved.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Finger {
    LeftThumb = 1,
    LeftIndex = 2,
    LeftMiddle = 3,
    LeftRing = 4,
    LeftLittle = 5,
    RightThumb = 6,
    RightIndex = 7,
    RightMiddle = 8,
    RightRing = 9,
    RightLittle = 10,
}

/// A stored print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintData {
    /// Id of the driver the print came from.
    pub driver_id: u16,

    /// Device type the print is tied to.
    pub devtype: u32,

    /// Payload kind.
    pub data_type: PrintDataType,

    /// Template payloads, one per enrolled sample.
    pub items: Vec<Vec<u8>>,
}

impl PrintData {
    /// Creates an empty stored print.
    pub fn new(driver_id: u16, devtype: u32, data_type: PrintDataType) -> Self {
        PrintData { driver_id, devtype, data_type, items: Vec::new() }
    }

    /// Whether two prints (or a print and a device) can be compared.
    ///
    /// Prints are compatible iff their driver id, device type, and payload kind all match.
    pub fn is_compatible(
        &self, driver_id: u16, devtype: u32, data_type: PrintDataType,
    ) -> bool {
        if self.driver_id != driver_id {
            fprint_logger::debug!(
                "driver id mismatch: {:04x} vs {:04x}", self.driver_id, driver_id
            );
            return false;
        }
        if self.devtype != devtype {
            fprint_logger::debug!("devtype mismatch: {:08x} vs {:08x}", self.devtype, devtype);
            return false;
        }
        self.data_type == data_type
    }

    /// Serializes the print to its wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let items_len: usize = self.items.iter().map(|item| 4 + item.len()).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + items_len);
        out.extend_from_slice(FP2_MAGIC);
        out.extend_from_slice(&self.driver_id.to_le_bytes());
        out.extend_from_slice(&self.devtype.to_le_bytes());
        out.push(self.data_type.into());
        for item in &self.items {
            out.extend_from_slice(&(item.len() as u32).to_le_bytes());
            out.extend_from_slice(item);
        }
        out
    }

    /// Parses a print from its wire form, accepting both FP2 and legacy FP1 data.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let mut reader = Reader(data);
        let magic = reader.get(3)?;
        let driver_id = u16::from_le_bytes(reader.get(2)?.try_into().unwrap());
        let devtype = u32::from_le_bytes(reader.get(4)?.try_into().unwrap());
        let data_type = PrintDataType::try_from(reader.get(1)?[0])
            .map_err(|_| Error::user(Code::InvalidArgument))?;
        let mut print = PrintData::new(driver_id, devtype, data_type);
        match magic {
            _ if magic == &FP2_MAGIC[..] => {
                while !reader.is_empty() {
                    let length =
                        u32::from_le_bytes(reader.get(4)?.try_into().unwrap()) as usize;
                    print.items.push(reader.get(length)?.to_vec());
                }
            }
            _ if magic == &FP1_MAGIC[..] => print.items.push(reader.finalize().to_vec()),
            _ => {
                fprint_logger::debug!("bad header prefix");
                return Err(Error::user(Code::InvalidArgument));
            }
        }
        Error::user(Code::InvalidLength).check(!print.items.is_empty())?;
        Ok(print)
    }
}

/// Length-checked slice reader.
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn get(&mut self, length: usize) -> Result<&'a [u8], Error> {
        Error::user(Code::InvalidLength).check(length <= self.0.len())?;
        let head;
        (head, self.0) = self.0.split_at(length);
        Ok(head)
    }

    fn finalize(self) -> &'a [u8] {
        self.0
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn fp2_round_trip() {
        let mut print = PrintData::new(0x1234, 0xaabbccdd, PrintDataType::Minutiae);
        print.items.push(vec![7; 50]);
        print.items.push(vec![42; 80]);
        let parsed = PrintData::parse(&print.serialize()).unwrap();
        assert_eq!(parsed, print);
    }

    #[test]
    fn fp1_body_is_one_entry() {
        let mut data = Vec::new();
        data.extend_from_slice(FP1_MAGIC);
        data.extend_from_slice(&0x0321u16.to_le_bytes());
        data.extend_from_slice(&7u32.to_le_bytes());
        data.push(0);
        data.extend_from_slice(b"legacy payload");
        let print = PrintData::parse(&data).unwrap();
        assert_eq!(print.driver_id, 0x0321);
        assert_eq!(print.devtype, 7);
        assert_eq!(print.data_type, PrintDataType::Raw);
        assert_eq!(print.items, [b"legacy payload".to_vec()]);
    }

    #[test]
    fn corrupted_prints_are_rejected() {
        let mut print = PrintData::new(1, 2, PrintDataType::Minutiae);
        print.items.push(vec![1, 2, 3]);
        let wire = print.serialize();
        // Truncated entry.
        assert!(PrintData::parse(&wire[.. wire.len() - 1]).is_err());
        // Bad magic.
        let mut bad = wire.clone();
        bad[2] = b'9';
        assert!(PrintData::parse(&bad).is_err());
        // No entries at all.
        assert!(PrintData::parse(&wire[.. HEADER_LEN]).is_err());
    }

    #[test]
    fn compatibility_requires_all_three_fields() {
        let print = PrintData::new(1, 2, PrintDataType::Minutiae);
        assert!(print.is_compatible(1, 2, PrintDataType::Minutiae));
        assert!(!print.is_compatible(3, 2, PrintDataType::Minutiae));
        assert!(!print.is_compatible(1, 4, PrintDataType::Minutiae));
        assert!(!print.is_compatible(1, 2, PrintDataType::Raw));
    }

    proptest! {
        #[test]
        fn round_trip_any_print(
            driver_id: u16,
            devtype: u32,
            items in prop::collection::vec(prop::collection::vec(any::<u8>(), 0 .. 64), 1 .. 8),
        ) {
            let print = PrintData { driver_id, devtype, data_type: PrintDataType::Minutiae, items };
            prop_assert_eq!(PrintData::parse(&print.serialize()).unwrap(), print);
        }
    }
}
