pub mod backup;
pub mod channel;
pub mod epg;
pub mod playlist;

pub use backup::{BackupDocument, ImportSummary, PlaylistBackup};
pub use channel::{
    CategoryFlag, CategoryFlagRecord, CategoryFlags, ChannelFlag, ChannelFlagRecord, ChannelFlags,
    ChannelRecord, Drm, Episode,
};
pub use epg::ProgrammeRecord;
pub use playlist::{PlaylistRecord, SourceKind, SyncStatus};
