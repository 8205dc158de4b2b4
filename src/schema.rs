//! Relational schema of the permission and inheritance tables.
//!
//! Both tables reference the resource table owned by the resource registry.

/// Resource table owned by the resource registry.
pub const RESOURCE_TABLE: &str = "resource";
/// Primary key column of [`RESOURCE_TABLE`].
pub const RESOURCE_ID: &str = "resource_id";

/// Permission table.
pub const PERMISSION_TABLE: &str = "permission";
/// Column holding the resource the grant belongs to.
pub const PERMISSION_AUTHORIZED_RESOURCE_ID: &str = "authorized_resource_id";
/// Column holding the resource the grant applies to.
pub const PERMISSION_TARGET_RESOURCE_ID: &str = "target_resource_id";
/// Column holding the granted action.
pub const PERMISSION_ACTION: &str = "action_";

/// Permission inheritance table.
pub const INHERITANCE_TABLE: &str = "permission_inheritance";
/// Column holding the resource whose grants are inherited.
pub const INHERITANCE_PARENT_RESOURCE_ID: &str = "parent_resource_id";
/// Column holding the inheriting resource.
pub const INHERITANCE_CHILD_RESOURCE_ID: &str = "child_resource_id";

/// DDL for both tables.
pub const CREATE_TABLES: &str = "\
CREATE TABLE permission (
    authorized_resource_id BIGINT NOT NULL REFERENCES resource (resource_id),
    target_resource_id BIGINT NOT NULL REFERENCES resource (resource_id),
    action_ VARCHAR(255) NOT NULL,
    PRIMARY KEY (action_, authorized_resource_id, target_resource_id)
);
CREATE TABLE permission_inheritance (
    parent_resource_id BIGINT NOT NULL REFERENCES resource (resource_id),
    child_resource_id BIGINT NOT NULL REFERENCES resource (resource_id),
    PRIMARY KEY (child_resource_id, parent_resource_id)
);
";
