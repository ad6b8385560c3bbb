//! Organisation hierarchy records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::serde_helpers::{int_from_any, json_encoded_first, optional_int};
use crate::error::CompassError;

/// Levels of the organisation tree, from the top down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UnitLevel {
    Organisation,
    Country,
    Region,
    County,
    District,
    Group,
}

impl UnitLevel {
    pub const ALL: [UnitLevel; 6] = [
        UnitLevel::Organisation,
        UnitLevel::Country,
        UnitLevel::Region,
        UnitLevel::County,
        UnitLevel::District,
        UnitLevel::Group,
    ];

    /// Level directly below this one, if any.
    pub fn child_level(self) -> Option<UnitLevel> {
        match self {
            UnitLevel::Organisation => Some(UnitLevel::Country),
            UnitLevel::Country => Some(UnitLevel::Region),
            UnitLevel::Region => Some(UnitLevel::County),
            UnitLevel::County => Some(UnitLevel::District),
            UnitLevel::District => Some(UnitLevel::Group),
            UnitLevel::Group => None,
        }
    }

    /// Endpoint listing the child units of a unit at this level.
    pub fn children_endpoint(self) -> Option<HierarchyEndpoint> {
        match self {
            UnitLevel::Organisation => Some(HierarchyEndpoint::Countries),
            UnitLevel::Country => Some(HierarchyEndpoint::Regions),
            UnitLevel::Region => Some(HierarchyEndpoint::Counties),
            UnitLevel::County => Some(HierarchyEndpoint::Districts),
            UnitLevel::District => Some(HierarchyEndpoint::Groups),
            UnitLevel::Group => None,
        }
    }

    /// Endpoint listing the sections attached directly to a unit at this level.
    pub fn sections_endpoint(self) -> HierarchyEndpoint {
        match self {
            UnitLevel::Organisation => HierarchyEndpoint::HqSections,
            UnitLevel::Country => HierarchyEndpoint::CountrySections,
            UnitLevel::Region => HierarchyEndpoint::RegionSections,
            UnitLevel::County => HierarchyEndpoint::CountySections,
            UnitLevel::District => HierarchyEndpoint::DistrictSections,
            UnitLevel::Group => HierarchyEndpoint::GroupSections,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitLevel::Organisation => "Organisation",
            UnitLevel::Country => "Country",
            UnitLevel::Region => "Region",
            UnitLevel::County => "County",
            UnitLevel::District => "District",
            UnitLevel::Group => "Group",
        }
    }
}

impl fmt::Display for UnitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitLevel {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitLevel::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let levels: Vec<&str> = UnitLevel::ALL.iter().map(|l| l.as_str()).collect();
                CompassError::Parse(format!(
                    "{} is not a valid unit level. Valid levels are {:?}",
                    s, levels
                ))
            })
    }
}

/// Hierarchy API endpoints, relative to `{base}/hierarchy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyEndpoint {
    Countries,
    HqSections,
    Regions,
    CountrySections,
    Counties,
    RegionSections,
    Districts,
    CountySections,
    Groups,
    DistrictSections,
    GroupSections,
}

impl HierarchyEndpoint {
    pub const ALL: [HierarchyEndpoint; 11] = [
        HierarchyEndpoint::Countries,
        HierarchyEndpoint::HqSections,
        HierarchyEndpoint::Regions,
        HierarchyEndpoint::CountrySections,
        HierarchyEndpoint::Counties,
        HierarchyEndpoint::RegionSections,
        HierarchyEndpoint::Districts,
        HierarchyEndpoint::CountySections,
        HierarchyEndpoint::Groups,
        HierarchyEndpoint::DistrictSections,
        HierarchyEndpoint::GroupSections,
    ];

    pub fn path(self) -> &'static str {
        match self {
            HierarchyEndpoint::Countries => "/countries",
            HierarchyEndpoint::HqSections => "/hq/sections",
            HierarchyEndpoint::Regions => "/regions",
            HierarchyEndpoint::CountrySections => "/country/sections",
            HierarchyEndpoint::Counties => "/counties",
            HierarchyEndpoint::RegionSections => "/region/sections",
            HierarchyEndpoint::Districts => "/districts",
            HierarchyEndpoint::CountySections => "/county/sections",
            HierarchyEndpoint::Groups => "/groups",
            HierarchyEndpoint::DistrictSections => "/district/sections",
            HierarchyEndpoint::GroupSections => "/group/sections",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HierarchyEndpoint::Countries => "countries",
            HierarchyEndpoint::HqSections => "hq_sections",
            HierarchyEndpoint::Regions => "regions",
            HierarchyEndpoint::CountrySections => "country_sections",
            HierarchyEndpoint::Counties => "counties",
            HierarchyEndpoint::RegionSections => "region_sections",
            HierarchyEndpoint::Districts => "districts",
            HierarchyEndpoint::CountySections => "county_sections",
            HierarchyEndpoint::Groups => "groups",
            HierarchyEndpoint::DistrictSections => "district_sections",
            HierarchyEndpoint::GroupSections => "group_sections",
        }
    }
}

impl FromStr for HierarchyEndpoint {
    type Err = CompassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HierarchyEndpoint::ALL
            .into_iter()
            .find(|endpoint| endpoint.name() == s.trim())
            .ok_or_else(|| {
                let names: Vec<&str> = HierarchyEndpoint::ALL.iter().map(|e| e.name()).collect();
                CompassError::Parse(format!(
                    "{} is not a valid hierarchy endpoint. Valid endpoints are {:?}",
                    s, names
                ))
            })
    }
}

/// Extra live data packed into a unit's `Tag` field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UnitTag {
    #[serde(rename = "org_status", default)]
    pub status: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "Members", default, deserialize_with = "optional_int")]
    pub member_count: Option<i64>,
    #[serde(rename = "SectionTypeDesc", default)]
    pub section_type: Option<String>,
}

/// A unit as returned by the hierarchy API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HierarchyUnitRecord {
    #[serde(rename = "Value", deserialize_with = "int_from_any")]
    pub id: i64,
    #[serde(rename = "Description")]
    pub name: String,
    #[serde(rename = "Parent", default, deserialize_with = "optional_int")]
    pub parent_id: Option<i64>,
    #[serde(rename = "Tag", default, deserialize_with = "json_encoded_first")]
    pub tag: Option<UnitTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyUnit {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub member_count: Option<i64>,
    /// Only set for sections
    pub section_type: Option<String>,
}

impl From<HierarchyUnitRecord> for HierarchyUnit {
    fn from(record: HierarchyUnitRecord) -> Self {
        let tag = record.tag.unwrap_or_default();
        HierarchyUnit {
            id: record.id,
            name: record.name,
            parent_id: record.parent_id,
            status: tag.status,
            address: tag.address,
            member_count: tag.member_count,
            section_type: tag.section_type,
        }
    }
}

/// A member found by a hierarchy search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyMember {
    #[serde(deserialize_with = "int_from_any")]
    pub contact_number: i64,
    #[serde(default)]
    pub name: String,
    /// Remaining columns Compass returns, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A unit with everything below it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub name: String,
    pub level: UnitLevel,
    pub children: Vec<HierarchyNode>,
    pub sections: Vec<HierarchyUnit>,
}

impl HierarchyNode {
    /// Every unit and section id in this subtree, this node first.
    pub fn unit_ids(&self) -> Vec<i64> {
        let mut ids = vec![self.id];
        ids.extend(self.sections.iter().map(|s| s.id));
        for child in &self.children {
            ids.extend(child.unit_ids());
        }
        ids
    }
}
