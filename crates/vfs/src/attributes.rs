use std::ops::BitOr;
use std::time::SystemTime;

/// Link count of a directory without subdirectories (`.` and its entry in
/// the parent).
pub const EMPTY_DIRECTORY_LINK_COUNT: u32 = 2;

/// Kind of filesystem node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileType {
    /// Directory.
    Directory,
    /// Regular file.
    Regular,
    /// Symbolic link.
    Symlink,
}

/// Access permissions of a node.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Permissions(u8);

impl Permissions {
    /// Contents may be read.
    pub const READ: Self = Self(0b001);
    /// Contents may be modified.
    pub const WRITE: Self = Self(0b010);
    /// File may be executed, or directory may be searched.
    pub const EXECUTE: Self = Self(0b100);

    /// Reports whether all permissions in `other` are granted.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Set of attributes a caller is interested in.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct AttributesMask(u32);

impl AttributesMask {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// [`Attributes::file_type`].
    pub const FILE_TYPE: Self = Self(1 << 0);
    /// [`Attributes::permissions`].
    pub const PERMISSIONS: Self = Self(1 << 1);
    /// [`Attributes::size_bytes`].
    pub const SIZE_BYTES: Self = Self(1 << 2);
    /// [`Attributes::change_id`].
    pub const CHANGE_ID: Self = Self(1 << 3);
    /// [`Attributes::link_count`].
    pub const LINK_COUNT: Self = Self(1 << 4);
    /// [`Attributes::last_data_modification_time`].
    pub const LAST_DATA_MODIFICATION_TIME: Self = Self(1 << 5);
    /// Every attribute.
    pub const ALL: Self = Self((1 << 6) - 1);

    /// Reports whether any attribute in `other` is requested.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for AttributesMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Attributes of a node. Unset fields were not requested or are not known.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes {
    file_type: Option<FileType>,
    permissions: Option<Permissions>,
    size_bytes: Option<u64>,
    change_id: Option<u64>,
    link_count: Option<u32>,
    last_data_modification_time: Option<SystemTime>,
}

impl Attributes {
    /// Returns the file type.
    #[must_use]
    pub const fn file_type(&self) -> Option<FileType> {
        self.file_type
    }

    /// Sets the file type.
    pub const fn set_file_type(&mut self, file_type: FileType) -> &mut Self {
        self.file_type = Some(file_type);
        self
    }

    /// Returns the permissions.
    #[must_use]
    pub const fn permissions(&self) -> Option<Permissions> {
        self.permissions
    }

    /// Sets the permissions.
    pub const fn set_permissions(&mut self, permissions: Permissions) -> &mut Self {
        self.permissions = Some(permissions);
        self
    }

    /// Returns the size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    /// Sets the size in bytes.
    pub const fn set_size_bytes(&mut self, size_bytes: u64) -> &mut Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Returns the change id, which increases whenever the node changes.
    #[must_use]
    pub const fn change_id(&self) -> Option<u64> {
        self.change_id
    }

    /// Sets the change id.
    pub const fn set_change_id(&mut self, change_id: u64) -> &mut Self {
        self.change_id = Some(change_id);
        self
    }

    /// Returns the link count.
    #[must_use]
    pub const fn link_count(&self) -> Option<u32> {
        self.link_count
    }

    /// Sets the link count.
    pub const fn set_link_count(&mut self, link_count: u32) -> &mut Self {
        self.link_count = Some(link_count);
        self
    }

    /// Returns the time at which the contents last changed.
    #[must_use]
    pub const fn last_data_modification_time(&self) -> Option<SystemTime> {
        self.last_data_modification_time
    }

    /// Sets the time at which the contents last changed.
    pub const fn set_last_data_modification_time(&mut self, time: SystemTime) -> &mut Self {
        self.last_data_modification_time = Some(time);
        self
    }
}
