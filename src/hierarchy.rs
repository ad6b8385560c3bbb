//! Organisation hierarchy traversal.

use log::info;

use crate::error::Result;
use crate::logon::Logon;
use crate::models::hierarchy::{
    HierarchyEndpoint, HierarchyMember, HierarchyNode, HierarchyUnit, UnitLevel,
};
use crate::scrapers::hierarchy::HierarchyScraper;

#[derive(Debug, Clone)]
pub struct Hierarchy {
    scraper: HierarchyScraper,
}

impl Hierarchy {
    pub fn new(logon: &Logon) -> Self {
        Hierarchy {
            scraper: HierarchyScraper::new(logon.client().clone()),
        }
    }

    pub fn units(&self, parent_unit: i64, endpoint: HierarchyEndpoint) -> Result<Vec<HierarchyUnit>> {
        self.scraper.units_from_hierarchy(parent_unit, endpoint)
    }

    /// Every unit and section below `unit_id`, which sits at `level`.
    ///
    /// The API can't name the starting unit, so the root node is named
    /// after its id.
    pub fn tree(&self, unit_id: i64, level: UnitLevel) -> Result<HierarchyNode> {
        info!("Building hierarchy below {} {}", level, unit_id);
        self.node(unit_id, unit_id.to_string(), level)
    }

    fn node(&self, id: i64, name: String, level: UnitLevel) -> Result<HierarchyNode> {
        let sections = self.units(id, level.sections_endpoint())?;

        let mut children = Vec::new();
        if let (Some(endpoint), Some(child_level)) = (level.children_endpoint(), level.child_level()) {
            for unit in self.units(id, endpoint)? {
                children.push(self.node(unit.id, unit.name, child_level)?);
            }
        }

        Ok(HierarchyNode {
            id,
            name,
            level,
            children,
            sections,
        })
    }

    /// Ids of every unit and section below (and including) `unit_id`.
    pub fn unit_ids(&self, unit_id: i64, level: UnitLevel) -> Result<Vec<i64>> {
        Ok(self.tree(unit_id, level)?.unit_ids())
    }

    pub fn members_in_unit(&self, unit_id: i64) -> Result<Vec<HierarchyMember>> {
        self.scraper.members_with_roles_in_unit(unit_id)
    }
}
