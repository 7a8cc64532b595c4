use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::model::role::Role;

/// Admin-panel sections that carry their own read/write grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum Section {
    Dashboard,
    Tutors,
    Hadiya,
    Centers,
    Students,
    TutorAttendance,
    GuestTutors,
    Announcements,
    Supervisors,
    Subjects,
    Admins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
}

impl Capability {
    pub fn allows(&self, mode: Access) -> bool {
        match mode {
            Access::Read => self.read,
            Access::Write => self.write,
        }
    }
}

/// Per-section grants, as carried in a supervisor's token.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMatrix(HashMap<Section, Capability>);

impl PermissionMatrix {
    #[cfg(test)]
    pub fn grant(mut self, section: Section, capability: Capability) -> Self {
        self.0.insert(section, capability);
        self
    }

    pub fn get(&self, section: Section) -> Capability {
        self.0.get(&section).copied().unwrap_or_default()
    }
}

pub trait PermissionResolver {
    fn has_permission(&self, section: Section, mode: Access) -> bool;
}

struct AdminGrants;

struct SupervisorGrants<'a>(&'a PermissionMatrix);

struct TutorGrants;

struct GuestGrants;

impl PermissionResolver for AdminGrants {
    fn has_permission(&self, _: Section, _: Access) -> bool {
        true
    }
}

impl PermissionResolver for SupervisorGrants<'_> {
    fn has_permission(&self, section: Section, mode: Access) -> bool {
        self.0.get(section).allows(mode)
    }
}

impl PermissionResolver for TutorGrants {
    // tutors only ever read their own attendance
    fn has_permission(&self, section: Section, mode: Access) -> bool {
        section == Section::TutorAttendance && mode == Access::Read
    }
}

impl PermissionResolver for GuestGrants {
    fn has_permission(&self, _: Section, _: Access) -> bool {
        false
    }
}

pub fn resolver_for(role: Role, matrix: &PermissionMatrix) -> Box<dyn PermissionResolver + '_> {
    match role {
        Role::Admin => Box::new(AdminGrants),
        Role::Supervisor => Box::new(SupervisorGrants(matrix)),
        Role::Tutor => Box::new(TutorGrants),
        Role::Guest => Box::new(GuestGrants),
    }
}
