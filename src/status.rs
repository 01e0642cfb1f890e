//! The kernel's status record for one loop device.

/// Capacity of the `lo_file_name` and `lo_crypt_name` fields, in bytes.
pub const LO_NAME_SIZE: usize = 64;
/// Capacity of the `lo_encrypt_key` field, in bytes.
pub const LO_KEY_SIZE: usize = 32;

/// The backing file is exposed read-only.
pub const LO_FLAGS_READ_ONLY: u32 = 1;
/// The device goes through the backing file's address-space operations.
pub const LO_FLAGS_USE_AOPS: u32 = 2;
/// The device detaches itself when the last reference is dropped.
pub const LO_FLAGS_AUTOCLEAR: u32 = 4;

/// Status information of a loop device (64-bit version).
///
/// This structure corresponds to the `loop_info64` struct used by the Linux
/// kernel. It holds metadata about a loop device: the backing file
/// association, offset/size limits, flags, and the legacy cryptoloop fields.
/// Layout, field order, widths, and endianness are the kernel ABI; the
/// kernel reads and writes this record verbatim through `LOOP_GET_STATUS64`
/// and `LOOP_SET_STATUS64`.
///
/// String fields are fixed-capacity and NUL-padded. The typed accessors
/// strip the padding on read; the setters truncate at capacity on write,
/// never overflow. Numeric fields are a pass-through: the kernel does not
/// validate them and neither does this type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInfo64 {
    lo_device: u64,
    lo_inode: u64,
    lo_rdevice: u64,
    lo_offset: u64,
    lo_sizelimit: u64,
    lo_number: u32,
    lo_encrypt_type: u32,
    lo_encrypt_key_size: u32,
    lo_flags: u32,
    lo_file_name: [u8; LO_NAME_SIZE],
    lo_crypt_name: [u8; LO_NAME_SIZE],
    lo_encrypt_key: [u8; LO_KEY_SIZE],
    lo_init: [u64; 2],
}

impl Default for LoopInfo64 {
    fn default() -> Self {
        Self {
            lo_device: 0,
            lo_inode: 0,
            lo_rdevice: 0,
            lo_offset: 0,
            lo_sizelimit: 0,
            lo_number: 0,
            lo_encrypt_type: 0,
            lo_encrypt_key_size: 0,
            lo_flags: 0,
            lo_file_name: [0; LO_NAME_SIZE],
            lo_crypt_name: [0; LO_NAME_SIZE],
            lo_encrypt_key: [0; LO_KEY_SIZE],
            lo_init: [0; 2],
        }
    }
}

impl LoopInfo64 {
    /// Width of the encoded record in bytes.
    pub const SIZE: usize = 232;

    /// Builds the record written by a `LOOP_SET_STATUS64` call: backing file
    /// name, offset, and size limit set, everything else zero.
    pub fn with_backing(file_name: &str, offset: u64, sizelimit: u64) -> Self {
        let mut info = Self {
            lo_offset: offset,
            lo_sizelimit: sizelimit,
            ..Self::default()
        };
        info.set_file_name(file_name);
        info
    }

    /// Device number of the filesystem holding the backing file.
    pub fn device(&self) -> u64 {
        self.lo_device
    }

    /// Inode number of the backing file.
    pub fn inode(&self) -> u64 {
        self.lo_inode
    }

    /// Device number assigned to this loop device.
    pub fn rdevice(&self) -> u64 {
        self.lo_rdevice
    }

    /// Byte offset into the backing file where the block device begins.
    pub fn offset(&self) -> u64 {
        self.lo_offset
    }

    /// Maximum exposed size in bytes; 0 exposes the whole file.
    pub fn sizelimit(&self) -> u64 {
        self.lo_sizelimit
    }

    /// Index of the loop device.
    pub fn number(&self) -> u32 {
        self.lo_number
    }

    /// Legacy cryptoloop transform id, usually 0.
    pub fn encrypt_type(&self) -> u32 {
        self.lo_encrypt_type
    }

    pub fn encrypt_key_size(&self) -> u32 {
        self.lo_encrypt_key_size
    }

    /// Raw `LO_FLAGS_*` bitset.
    pub fn flags(&self) -> u32 {
        self.lo_flags
    }

    /// Path of the backing file, with NUL padding stripped.
    pub fn file_name(&self) -> String {
        trim_padding(&self.lo_file_name)
    }

    /// Legacy cryptoloop algorithm name, with NUL padding stripped.
    pub fn crypt_name(&self) -> String {
        trim_padding(&self.lo_crypt_name)
    }

    /// Legacy key material, truncated to `encrypt_key_size`.
    pub fn encrypt_key(&self) -> &[u8] {
        let len = (self.lo_encrypt_key_size as usize).min(LO_KEY_SIZE);
        &self.lo_encrypt_key[..len]
    }

    /// The two reserved words at the end of the record.
    pub fn init(&self) -> [u64; 2] {
        self.lo_init
    }

    pub fn is_read_only(&self) -> bool {
        self.lo_flags & LO_FLAGS_READ_ONLY != 0
    }

    pub fn uses_aops(&self) -> bool {
        self.lo_flags & LO_FLAGS_USE_AOPS != 0
    }

    pub fn is_autoclear(&self) -> bool {
        self.lo_flags & LO_FLAGS_AUTOCLEAR != 0
    }

    /// Sets the backing file name, truncating at [`LO_NAME_SIZE`] bytes.
    pub fn set_file_name(&mut self, file_name: &str) {
        self.lo_file_name = [0; LO_NAME_SIZE];
        let bytes = file_name.as_bytes();
        let len = bytes.len().min(LO_NAME_SIZE);
        self.lo_file_name[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.lo_offset = offset;
    }

    pub fn set_sizelimit(&mut self, sizelimit: u64) {
        self.lo_sizelimit = sizelimit;
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.lo_flags = flags;
    }

    /// Serializes the record to its little-endian wire form.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.lo_device.to_le_bytes());
        buf[8..16].copy_from_slice(&self.lo_inode.to_le_bytes());
        buf[16..24].copy_from_slice(&self.lo_rdevice.to_le_bytes());
        buf[24..32].copy_from_slice(&self.lo_offset.to_le_bytes());
        buf[32..40].copy_from_slice(&self.lo_sizelimit.to_le_bytes());
        buf[40..44].copy_from_slice(&self.lo_number.to_le_bytes());
        buf[44..48].copy_from_slice(&self.lo_encrypt_type.to_le_bytes());
        buf[48..52].copy_from_slice(&self.lo_encrypt_key_size.to_le_bytes());
        buf[52..56].copy_from_slice(&self.lo_flags.to_le_bytes());
        buf[56..120].copy_from_slice(&self.lo_file_name);
        buf[120..184].copy_from_slice(&self.lo_crypt_name);
        buf[184..216].copy_from_slice(&self.lo_encrypt_key);
        buf[216..224].copy_from_slice(&self.lo_init[0].to_le_bytes());
        buf[224..232].copy_from_slice(&self.lo_init[1].to_le_bytes());
        buf
    }

    /// Deserializes a record from its little-endian wire form.
    ///
    /// Exact inverse of [`encode`](Self::encode): `decode(&encode(&r)) == r`
    /// for every representable record. No field is validated.
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let mut lo_file_name = [0u8; LO_NAME_SIZE];
        lo_file_name.copy_from_slice(&buf[56..120]);
        let mut lo_crypt_name = [0u8; LO_NAME_SIZE];
        lo_crypt_name.copy_from_slice(&buf[120..184]);
        let mut lo_encrypt_key = [0u8; LO_KEY_SIZE];
        lo_encrypt_key.copy_from_slice(&buf[184..216]);

        Self {
            lo_device: read_u64(buf, 0),
            lo_inode: read_u64(buf, 8),
            lo_rdevice: read_u64(buf, 16),
            lo_offset: read_u64(buf, 24),
            lo_sizelimit: read_u64(buf, 32),
            lo_number: read_u32(buf, 40),
            lo_encrypt_type: read_u32(buf, 44),
            lo_encrypt_key_size: read_u32(buf, 48),
            lo_flags: read_u32(buf, 52),
            lo_file_name,
            lo_crypt_name,
            lo_encrypt_key,
            lo_init: [read_u64(buf, 216), read_u64(buf, 224)],
        }
    }
}

/// Cuts a fixed-capacity field at its first NUL byte.
fn trim_padding(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn read_u64(buf: &[u8; LoopInfo64::SIZE], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}

fn read_u32(buf: &[u8; LoopInfo64::SIZE], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(word)
}
