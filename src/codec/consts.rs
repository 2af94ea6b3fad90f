/// IPROTO map keys.
///
/// Describes only keys, used in this crate.
pub mod keys {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const RESPONSE_CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USER_NAME: u8 = 0x23;
    pub const EXPR: u8 = 0x27;
    pub const OPS: u8 = 0x28;
    pub const ARGS: u8 = 0x29;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const ERROR: u8 = 0x52;
}

/// IPROTO response codes.
pub mod response_codes {
    pub const OK: u32 = 0;

    /// Low 15 bits of a non-zero response code carry the error class.
    pub const ERROR_CLASS_MASK: u32 = 0x7fff;
}

/// IPROTO command codes.
///
/// Describes only types, used in this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    /// Legacy CALL request - wraps result into [tuple, tuple, ...] format.
    Call16 = 6,
    Auth = 7,
    Eval = 8,
    Upsert = 9,
    /// CALL request - returns arbitrary MessagePack.
    Call = 10,
    Ping = 64,
}

/// Iterator type for `SELECT` requests.
///
/// [Docs](https://www.tarantool.io/en/doc/latest/reference/reference_lua/box_index/pairs/).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum IteratorType {
    /// Key == x ASC order.
    #[default]
    Eq = 0,
    /// Key == x DESC order.
    Req = 1,
    /// All tuples.
    All = 2,
    /// Key < x.
    Lt = 3,
    /// Key <= x.
    Le = 4,
    /// Key >= x.
    Ge = 5,
    /// Key > x.
    Gt = 6,
    /// All bits of x are set in key.
    BitsAllSet = 7,
    /// Any bit of x is set in key.
    BitsAnySet = 8,
    /// No bit of x is set in key.
    BitsAllNotSet = 9,
    /// Key overlaps x (RTREE only).
    Overlaps = 10,
    /// Tuples in distance ascending order from specified point (RTREE only).
    Neighbor = 11,
}
