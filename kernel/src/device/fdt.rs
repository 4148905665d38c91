//! Boot-time discovery from the flattened device tree.
//!
//! Only what the boot handoff needs is read here: the harts the platform
//! reports, the RAM range, the blob's own extent and the kernel command line.
//! Lookups go through `find_node` so that a malformed tree yields an error
//! instead of a panic inside the parser.

use fdt::{Fdt, FdtError};
use thiserror::Error;

use crate::boot::{HartId, HartMask};
use crate::layout::MAX_HARTS;
use crate::mem::PhysRange;

#[derive(Debug, Error)]
pub enum DeviceTreeError {
    #[error("invalid device tree blob: {0:?}")]
    Parse(FdtError),
    #[error("device tree has no /cpus node")]
    MissingCpus,
    #[error("device tree lists no enabled harts")]
    NoHarts,
    #[error("device tree has no usable /memory node")]
    MissingMemory,
}

impl From<FdtError> for DeviceTreeError {
    fn from(err: FdtError) -> Self {
        DeviceTreeError::Parse(err)
    }
}

/// Parsed hardware description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo<'a> {
    /// Enabled harts that fit a [`HartMask`].
    pub harts: HartMask,
    /// Enabled harts whose id is too large to track.
    pub untracked_harts: usize,
    pub memory: PhysRange,
    pub dtb: PhysRange,
    pub bootargs: Option<&'a str>,
}

impl<'a> DeviceInfo<'a> {
    pub fn from_fdt(fdt: &Fdt<'a>, dtb_addr: usize) -> Result<Self, DeviceTreeError> {
        let (harts, untracked_harts) = present_harts(fdt)?;
        Ok(Self {
            harts,
            untracked_harts,
            memory: memory_range(fdt)?,
            dtb: PhysRange::from_len(dtb_addr, fdt.total_size()),
            bootargs: bootargs(fdt),
        })
    }
}

fn present_harts(fdt: &Fdt<'_>) -> Result<(HartMask, usize), DeviceTreeError> {
    let cpus = fdt.find_node("/cpus").ok_or(DeviceTreeError::MissingCpus)?;

    let mut mask = HartMask::EMPTY;
    let mut untracked = 0;
    for cpu in cpus.children() {
        if cpu.name.split('@').next() != Some("cpu") {
            continue;
        }
        let disabled = cpu
            .property("status")
            .and_then(|status| status.as_str())
            .is_some_and(|status| status == "disabled");
        if disabled {
            continue;
        }
        let Some(id) = cpu.property("reg").and_then(|reg| reg.as_usize()) else {
            continue;
        };
        if id >= MAX_HARTS {
            untracked += 1;
        } else {
            mask = mask.with(HartId::new(id));
        }
    }

    if mask.is_empty() && untracked == 0 {
        return Err(DeviceTreeError::NoHarts);
    }
    Ok((mask, untracked))
}

fn memory_range(fdt: &Fdt<'_>) -> Result<PhysRange, DeviceTreeError> {
    let memory = fdt
        .find_node("/memory")
        .ok_or(DeviceTreeError::MissingMemory)?;
    memory
        .reg()
        .into_iter()
        .flatten()
        .find_map(|region| {
            let size = region.size.filter(|size| *size > 0)?;
            Some(PhysRange::from_len(region.starting_address as usize, size))
        })
        .ok_or(DeviceTreeError::MissingMemory)
}

fn bootargs<'a>(fdt: &Fdt<'a>) -> Option<&'a str> {
    fdt.find_node("/chosen")?
        .property("bootargs")?
        .as_str()
        .filter(|args| !args.is_empty())
}

/// Builds flattened device trees in memory.
#[cfg(test)]
pub(crate) mod builder {
    const MAGIC: u32 = 0xd00d_feed;
    const BEGIN_NODE: u32 = 1;
    const END_NODE: u32 = 2;
    const PROP: u32 = 3;
    const END: u32 = 9;
    const HEADER_LEN: usize = 40;
    const RESERVE_MAP_LEN: usize = 16;

    #[derive(Default)]
    pub struct DtbBuilder {
        structs: Vec<u8>,
        strings: Vec<u8>,
    }

    impl DtbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        fn word(&mut self, value: u32) {
            self.structs.extend_from_slice(&value.to_be_bytes());
        }

        fn pad(&mut self) {
            while self.structs.len() % 4 != 0 {
                self.structs.push(0);
            }
        }

        fn string_offset(&mut self, name: &str) -> u32 {
            let offset = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            offset
        }

        pub fn begin_node(&mut self, name: &str) -> &mut Self {
            self.word(BEGIN_NODE);
            self.structs.extend_from_slice(name.as_bytes());
            self.structs.push(0);
            self.pad();
            self
        }

        pub fn end_node(&mut self) -> &mut Self {
            self.word(END_NODE);
            self
        }

        pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
            let name_offset = self.string_offset(name);
            self.word(PROP);
            self.word(value.len() as u32);
            self.word(name_offset);
            self.structs.extend_from_slice(value);
            self.pad();
            self
        }

        pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
            self.prop(name, &value.to_be_bytes())
        }

        pub fn prop_u64s(&mut self, name: &str, values: &[u64]) -> &mut Self {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            self.prop(name, &bytes)
        }

        pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
            let mut bytes = value.as_bytes().to_vec();
            bytes.push(0);
            self.prop(name, &bytes)
        }

        pub fn finish(&mut self) -> Vec<u8> {
            self.word(END);
            let off_struct = HEADER_LEN + RESERVE_MAP_LEN;
            let off_strings = off_struct + self.structs.len();
            let total = off_strings + self.strings.len();

            let header = [
                MAGIC,
                total as u32,
                off_struct as u32,
                off_strings as u32,
                HEADER_LEN as u32,
                17,
                16,
                0,
                self.strings.len() as u32,
                self.structs.len() as u32,
            ];
            let mut blob: Vec<u8> = header.iter().flat_map(|w| w.to_be_bytes()).collect();
            blob.resize(off_struct, 0);
            blob.extend_from_slice(&self.structs);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    /// A `virt`-like tree. Each hart is `(id, status)`.
    pub fn virt_tree(harts: &[(u32, &str)], memory: Option<(u64, u64)>, bootargs: &str) -> Vec<u8> {
        let mut dtb = DtbBuilder::new();
        dtb.begin_node("")
            .prop_u32("#address-cells", 2)
            .prop_u32("#size-cells", 2)
            .prop_str("compatible", "riscv-virtio");

        dtb.begin_node("chosen")
            .prop_str("bootargs", bootargs)
            .end_node();

        if let Some((base, size)) = memory {
            dtb.begin_node(&format!("memory@{base:x}"))
                .prop_str("device_type", "memory")
                .prop_u64s("reg", &[base, size])
                .end_node();
        }

        dtb.begin_node("cpus")
            .prop_u32("#address-cells", 1)
            .prop_u32("#size-cells", 0)
            .prop_u32("timebase-frequency", 10_000_000);
        for (id, status) in harts {
            dtb.begin_node(&format!("cpu@{id}"))
                .prop_str("device_type", "cpu")
                .prop_u32("reg", *id)
                .prop_str("status", status)
                .prop_str("compatible", "riscv")
                .end_node();
        }
        dtb.begin_node("cpu-map").end_node();
        dtb.end_node();

        dtb.end_node();
        dtb.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::builder::virt_tree;
    use super::*;

    const DTB_ADDR: usize = 0x8220_0000;
    const RAM: Option<(u64, u64)> = Some((0x8000_0000, 0x800_0000));

    #[test]
    fn test_virt_machine() {
        let blob = virt_tree(
            &[(0, "okay"), (1, "okay"), (2, "okay"), (3, "okay")],
            RAM,
            "console=sbi",
        );
        let fdt = Fdt::new(&blob).unwrap();
        let info = DeviceInfo::from_fdt(&fdt, DTB_ADDR).unwrap();

        assert_eq!(info.harts, HartMask::below(4));
        assert_eq!(info.untracked_harts, 0);
        assert_eq!(info.memory, PhysRange::new(0x8000_0000, 0x8800_0000));
        assert_eq!(info.dtb, PhysRange::from_len(DTB_ADDR, blob.len()));
        assert_eq!(info.bootargs, Some("console=sbi"));
    }

    #[test]
    fn test_disabled_harts_are_skipped() {
        let blob = virt_tree(&[(0, "okay"), (1, "disabled"), (2, "okay")], RAM, "");
        let fdt = Fdt::new(&blob).unwrap();
        let info = DeviceInfo::from_fdt(&fdt, DTB_ADDR).unwrap();

        assert_eq!(info.harts.bits(), 0b101);
        assert_eq!(info.bootargs, None);
    }

    #[test]
    fn test_harts_past_mask_are_counted() {
        let blob = virt_tree(&[(0, "okay"), (1, "okay"), (70, "okay"), (90, "disabled")], RAM, "");
        let fdt = Fdt::new(&blob).unwrap();
        let info = DeviceInfo::from_fdt(&fdt, DTB_ADDR).unwrap();

        assert_eq!(info.harts, HartMask::below(2));
        assert_eq!(info.untracked_harts, 1);
    }

    #[test]
    fn test_missing_memory() {
        let blob = virt_tree(&[(0, "okay")], None, "");
        let fdt = Fdt::new(&blob).unwrap();
        assert!(matches!(
            DeviceInfo::from_fdt(&fdt, DTB_ADDR),
            Err(DeviceTreeError::MissingMemory)
        ));
    }

    #[test]
    fn test_no_enabled_harts() {
        let blob = virt_tree(&[(0, "disabled")], RAM, "");
        let fdt = Fdt::new(&blob).unwrap();
        assert!(matches!(
            DeviceInfo::from_fdt(&fdt, DTB_ADDR),
            Err(DeviceTreeError::NoHarts)
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut blob = virt_tree(&[(0, "okay")], RAM, "");
        blob[0] = 0;
        assert!(matches!(
            Fdt::new(&blob).map_err(DeviceTreeError::from),
            Err(DeviceTreeError::Parse(FdtError::BadMagic))
        ));
    }
}
