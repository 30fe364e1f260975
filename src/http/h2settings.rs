//! HTTP/2 SETTINGS configuration for browser fingerprinting.
//!
//! Anti-bot systems fingerprint which SETTINGS a client sends, their values,
//! their order and the size of the first connection-level WINDOW_UPDATE.
//! Unset entries are not sent at all.
//!
//! Based on Chromium's spdy_session.h defaults and real browser captures.

/// SETTINGS parameter identifiers (RFC 9113 §6.5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SettingId {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

impl SettingId {
    pub fn from_u16(id: u16) -> Option<Self> {
        match id {
            0x1 => Some(SettingId::HeaderTableSize),
            0x2 => Some(SettingId::EnablePush),
            0x3 => Some(SettingId::MaxConcurrentStreams),
            0x4 => Some(SettingId::InitialWindowSize),
            0x5 => Some(SettingId::MaxFrameSize),
            0x6 => Some(SettingId::MaxHeaderListSize),
            _ => None,
        }
    }
}

/// RFC 9113 default stream and connection window.
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;
/// RFC 9113 default maximum frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

const CHROME_ORDER: &[SettingId] = &[
    SettingId::HeaderTableSize,
    SettingId::EnablePush,
    SettingId::InitialWindowSize,
    SettingId::MaxHeaderListSize,
];

const FIREFOX_ORDER: &[SettingId] = &[
    SettingId::HeaderTableSize,
    SettingId::EnablePush,
    SettingId::InitialWindowSize,
    SettingId::MaxFrameSize,
];

const SAFARI_ORDER: &[SettingId] = &[
    SettingId::EnablePush,
    SettingId::MaxConcurrentStreams,
    SettingId::InitialWindowSize,
    SettingId::MaxHeaderListSize,
];

/// HTTP/2 SETTINGS configuration.
/// Values are sent in the SETTINGS frame during connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2Settings {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1) - HPACK dynamic table size
    pub header_table_size: Option<u32>,
    /// SETTINGS_ENABLE_PUSH (0x2) - Server push enabled
    pub enable_push: Option<bool>,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    pub max_concurrent_streams: Option<u32>,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4) - Flow control window
    pub initial_window_size: Option<u32>,
    /// SETTINGS_MAX_FRAME_SIZE (0x5) - Maximum frame payload
    pub max_frame_size: Option<u32>,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6) - Maximum header block size
    pub max_header_list_size: Option<u32>,
    /// Emission order. Entries whose value is unset are skipped.
    pub order: &'static [SettingId],
    /// Increment of the connection WINDOW_UPDATE sent after the preface.
    /// Zero sends none.
    pub connection_window_increment: u32,
}

impl Default for H2Settings {
    fn default() -> Self {
        Self::chrome()
    }
}

impl H2Settings {
    /// Chrome 120+ HTTP/2 SETTINGS.
    pub fn chrome() -> Self {
        Self {
            header_table_size: Some(65536),
            enable_push: Some(false), // Chrome disabled push in 2022
            max_concurrent_streams: None,
            initial_window_size: Some(6291456), // 6MB
            max_frame_size: None,
            max_header_list_size: Some(262144), // 256KB
            order: CHROME_ORDER,
            connection_window_increment: 15663105,
        }
    }

    /// Firefox 120+ HTTP/2 SETTINGS.
    pub fn firefox() -> Self {
        Self {
            header_table_size: Some(65536),
            enable_push: Some(false),
            max_concurrent_streams: None,
            initial_window_size: Some(131072),
            max_frame_size: Some(16384),
            max_header_list_size: None,
            order: FIREFOX_ORDER,
            connection_window_increment: 12517377,
        }
    }

    /// Safari 17+ / iOS 17+ HTTP/2 SETTINGS.
    pub fn safari() -> Self {
        Self {
            header_table_size: None, // Safari keeps the 4096 default and doesn't send it
            enable_push: Some(false),
            max_concurrent_streams: Some(100),
            initial_window_size: Some(2097152),
            max_frame_size: None,
            max_header_list_size: Some(0),
            order: SAFARI_ORDER,
            connection_window_increment: 10420225,
        }
    }

    /// `(identifier, value)` pairs in emission order.
    pub fn entries(&self) -> Vec<(SettingId, u32)> {
        self.order
            .iter()
            .filter_map(|id| {
                let value = match id {
                    SettingId::HeaderTableSize => self.header_table_size,
                    SettingId::EnablePush => self.enable_push.map(u32::from),
                    SettingId::MaxConcurrentStreams => self.max_concurrent_streams,
                    SettingId::InitialWindowSize => self.initial_window_size,
                    SettingId::MaxFrameSize => self.max_frame_size,
                    SettingId::MaxHeaderListSize => self.max_header_list_size,
                }?;
                Some((*id, value))
            })
            .collect()
    }

    /// Receive window we advertise for each stream.
    pub fn stream_window(&self) -> u32 {
        self.initial_window_size.unwrap_or(DEFAULT_WINDOW_SIZE)
    }

    /// Receive window we advertise for the connection.
    pub fn connection_window(&self) -> u32 {
        DEFAULT_WINDOW_SIZE.saturating_add(self.connection_window_increment)
    }

    /// Largest frame payload we accept.
    pub fn local_max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// HPACK dynamic table size our decoder allows.
    pub fn local_header_table_size(&self) -> u32 {
        self.header_table_size.unwrap_or(4096)
    }
}
