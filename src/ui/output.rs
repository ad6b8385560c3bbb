//! Console and file output.
//!
//! This module handles everything the CLI shows or writes, including:
//! - Human-readable summaries of member, hierarchy and report results
//! - JSON output of any result
//! - CSV exports of role and member tables

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::batch::BatchOutcome;
use crate::error::{CompassError, Result};
use crate::logon::Logon;
use crate::models::hierarchy::{HierarchyMember, HierarchyNode, HierarchyUnit};
use crate::models::member::{
    MemberAward, MemberDetails, MemberDisclosure, MemberMandatoryTraining, MemberPermit,
    MemberRolePopup, MemberRolesCollection, MemberTrainingTab, OngoingLearning,
};

/// Prints any result as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints who is logged in and with which role.
///
/// # Arguments
/// * `logon` - The logged-in session
/// * `threads` - Number of concurrent requests configured for batch commands
pub fn print_session_summary(logon: &Logon, threads: usize) {
    let (title, location) = logon.current_role();
    println!(
        "🔐 Logged in as {} with role '{} - {}'",
        logon.membership_number(),
        title,
        location
    );
    println!("🔧 Using {} concurrent requests for batch commands", threads);
}

fn show<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Prints a member's personal details.
///
/// # Arguments
/// * `details` - Personal details from the member's profile
pub fn print_member(details: &MemberDetails) {
    println!("\n👤 Member {}", details.membership_number);
    println!("\tName: {}", show(&details.name));
    println!("\tKnown as: {}", show(&details.known_as));
    println!("\tJoined: {}", show(&details.join_date));
    println!("\tBorn: {}", show(&details.birth_date));
    println!("\tEmail: {}", show(&details.main_email));
    println!("\tPhone: {}", show(&details.main_phone));
    println!("\tPostcode: {}", show(&details.postcode));
}

/// Prints a member's roles and membership duration.
///
/// # Arguments
/// * `membership_number` - Member the roles belong to
/// * `roles` - Roles collection returned by the Roles tab
pub fn print_roles(membership_number: i64, roles: &MemberRolesCollection) {
    println!(
        "\n🎭 Member {}: {} roles, {:.1} years of volunteering",
        membership_number,
        roles.roles.len(),
        roles.membership_duration
    );
    for role in roles.roles.values() {
        println!(
            "\t- [{}] {} ({}) at {}, from {} to {}",
            role.role_status,
            role.role_title,
            role.role_number,
            role.location_name,
            show(&role.role_start),
            show(&role.role_end)
        );
    }
}

/// Prints the details popup of a single role.
///
/// # Arguments
/// * `popup` - Role details including line manager, approvals and locations
pub fn print_role_detail(popup: &MemberRolePopup) {
    let details = &popup.details;
    println!(
        "\n📋 Role {}: {} for member {}",
        details.role_number,
        show(&details.role_title),
        details.membership_number
    );
    println!("\tStatus: {}", show(&details.role_status));
    println!("\tLine manager: {}", show(&details.line_manager));
    println!("\tReview due: {}", show(&details.review_date));
    println!("\tReferences: {}", show(&details.references));
    println!("\tDisclosure: {}", show(&details.disclosure_check));
    for (module, status) in &popup.getting_started {
        match status.validated {
            Some(date) => println!("\t✅ {} validated on {}", module, date),
            None => println!("\t⚠️  {} not validated", module),
        }
    }
}

/// Prints a member's permits.
///
/// # Arguments
/// * `membership_number` - Member the permits belong to
/// * `permits` - Permits from the Permits tab
pub fn print_permits(membership_number: i64, permits: &[MemberPermit]) {
    if permits.is_empty() {
        println!("✅ No permits found for member {}", membership_number);
        return;
    }
    println!("\n🏕️  Member {}: {} permits", membership_number, permits.len());
    for permit in permits {
        println!(
            "\t- {} {} ({}), expires {}",
            permit.category,
            permit.kind,
            permit.permit_type,
            permit
                .expires
                .map(|d| d.to_string())
                .unwrap_or_else(|| "never (revoked)".to_string())
        );
    }
}

fn print_learning(name: &str, learning: &OngoingLearning) {
    match learning.completed_date {
        Some(date) => println!(
            "\t✅ {}: completed {}, renew by {}",
            name,
            date,
            show(&learning.renewal_date)
        ),
        None => println!("\t❗ {}: not completed", name),
    }
}

/// Prints the mandatory ongoing learning dates.
///
/// # Arguments
/// * `membership_number` - Member the training belongs to
/// * `mandatory` - GDPR, safety, safeguarding and first aid records
pub fn print_mandatory_training(membership_number: i64, mandatory: &MemberMandatoryTraining) {
    println!("\n📚 Member {}: mandatory learning", membership_number);
    print_learning("Safety", &mandatory.safety);
    print_learning("Safeguarding", &mandatory.safeguarding);
    print_learning("First aid", &mandatory.first_aid);
    print_learning("GDPR", &mandatory.gdpr);
}

/// Prints role training progress and personal learning plans.
///
/// # Arguments
/// * `membership_number` - Member the training belongs to
/// * `training` - Parsed Training tab
pub fn print_training(membership_number: i64, training: &MemberTrainingTab) {
    println!(
        "\n📚 Member {}: {} roles with training, {} learning plans",
        membership_number,
        training.roles.len(),
        training.plps.len()
    );
    for role in training.roles.values() {
        match role.completion_date {
            Some(date) => println!("\t✅ {}: {} on {}", role.role_title, show(&role.completion_type), date),
            None => println!("\t⚠️  {}: training not complete", role.role_title),
        }
    }
    print_mandatory_training(membership_number, &training.mandatory);
}

/// Prints a member's awards.
///
/// # Arguments
/// * `membership_number` - Member the awards belong to
/// * `awards` - Awards from the Awards tab
pub fn print_awards(membership_number: i64, awards: &[MemberAward]) {
    if awards.is_empty() {
        println!("✅ No awards found for member {}", membership_number);
        return;
    }
    println!("\n🏅 Member {}: {} awards", membership_number, awards.len());
    for award in awards {
        println!("\t- {} ({}), {}", award.kind, show(&award.location), show(&award.date));
    }
}

/// Prints a member's disclosure checks.
///
/// # Arguments
/// * `membership_number` - Member the disclosures belong to
/// * `disclosures` - Disclosures from the Disclosures tab
pub fn print_disclosures(membership_number: i64, disclosures: &[MemberDisclosure]) {
    if disclosures.is_empty() {
        println!("⚠️  No disclosures found for member {}", membership_number);
        return;
    }
    println!(
        "\n🛡️  Member {}: {} disclosures",
        membership_number,
        disclosures.len()
    );
    for disclosure in disclosures {
        println!(
            "\t- {} {} [{}], issued {}, expires {}",
            disclosure.provider,
            disclosure.kind,
            disclosure.status,
            show(&disclosure.issue_date),
            show(&disclosure.expiry_date)
        );
    }
}

/// Prints the units directly below a parent unit.
///
/// # Arguments
/// * `parent_unit` - Unit the listing was requested for
/// * `units` - Child units returned by the hierarchy endpoint
pub fn print_units(parent_unit: i64, units: &[HierarchyUnit]) {
    println!("\n🗺️  {} units below {}", units.len(), parent_unit);
    for unit in units {
        println!(
            "\t- {} ({}) {} members",
            unit.name,
            unit.id,
            show(&unit.member_count)
        );
    }
}

/// Prints a unit tree, indenting each level.
///
/// # Arguments
/// * `node` - Root of the tree
pub fn print_tree(node: &HierarchyNode) {
    print_node(node, 0);
    println!("\n🔚 {} units and sections in total", node.unit_ids().len());
}

fn print_node(node: &HierarchyNode, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}- {} {} ({})", indent, node.level, node.name, node.id);
    for section in &node.sections {
        println!(
            "{}  · {} ({}) {}",
            indent,
            section.name,
            section.id,
            show(&section.section_type)
        );
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

/// Prints the members found in each unit.
///
/// # Arguments
/// * `outcome` - Members per unit, plus units whose search failed
pub fn print_unit_members(outcome: &BatchOutcome<i64, Vec<HierarchyMember>>) {
    for (unit, members) in &outcome.results {
        println!("\n👥 Unit {}: {} members", unit, members.len());
        for member in members {
            println!("\t- {} ({})", member.name, member.contact_number);
        }
    }
}

/// Prints items a batch command could not fetch.
///
/// # Arguments
/// * `skipped` - Failed items with their error message
pub fn print_skipped<K: std::fmt::Display>(skipped: &[(K, String)]) {
    if skipped.is_empty() {
        return;
    }
    println!("\n⚠️  Total items skipped: {}", skipped.len());
    for (item, reason) in skipped {
        println!("\t- {}: {}", item, reason);
    }
}

fn csv_error(path: &Path, err: impl std::fmt::Display) -> CompassError {
    CompassError::Config(format!("Can't write '{}': {}", path.display(), err))
}

/// Writes every role of every member to a CSV file, one role per row.
pub fn write_roles_csv(path: &Path, roles: &BatchOutcome<i64, MemberRolesCollection>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for collection in roles.results.values() {
        for role in collection.roles.values() {
            writer.serialize(role).map_err(|e| csv_error(path, e))?;
        }
    }
    writer.flush()?;
    println!("💾 Roles written to {}", path.display());
    Ok(())
}

/// Writes members to a CSV file.
///
/// Search results carry different columns per unit, so the header is the
/// union of every column seen.
pub fn write_members_csv(
    path: &Path,
    members: &BatchOutcome<i64, Vec<HierarchyMember>>,
) -> Result<()> {
    let extra_columns: BTreeSet<&String> = members
        .results
        .values()
        .flatten()
        .flat_map(|member| member.extra.keys())
        .collect();

    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    let mut header = vec!["unit", "contact_number", "name"];
    header.extend(extra_columns.iter().map(|c| c.as_str()));
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for (unit, unit_members) in &members.results {
        for member in unit_members {
            let mut record = vec![
                unit.to_string(),
                member.contact_number.to_string(),
                member.name.clone(),
            ];
            record.extend(extra_columns.iter().map(|column| {
                match member.extra.get(*column) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                }
            }));
            writer.write_record(&record).map_err(|e| csv_error(path, e))?;
        }
    }
    writer.flush()?;
    println!("💾 Members written to {}", path.display());
    Ok(())
}

/// Saves an exported report.
pub fn write_report(path: &Path, report: &[u8]) -> Result<()> {
    fs::write(path, report)?;
    println!(
        "💾 Report saved to {} ({} bytes)",
        path.display(),
        report.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::member::{MemberRoleCore, RoleStatus};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    #[test]
    fn roles_csv_has_one_row_per_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.csv");

        let role = MemberRoleCore {
            role_number: 5,
            membership_number: 1,
            role_title: "Beaver Scout Leader".into(),
            role_class: "Leader".into(),
            role_type: None,
            location_id: Some(42),
            location_name: "1st Somewhere".into(),
            role_start: NaiveDate::from_ymd_opt(2015, 9, 1),
            role_end: None,
            role_status: RoleStatus::Full,
            review_date: None,
            can_view_details: true,
        };
        let mut outcome = BatchOutcome::default();
        outcome.results.insert(
            1,
            MemberRolesCollection {
                roles: BTreeMap::from([(5, role)]),
                membership_duration: 1.0,
            },
        );

        write_roles_csv(&path, &outcome).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("role_number,membership_number,role_title"));
        assert!(lines[1].contains("Beaver Scout Leader"));
        assert!(lines[1].contains("2015-09-01"));
    }

    #[test]
    fn members_csv_unions_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.csv");

        let member = |number: i64, extra: &[(&str, &str)]| HierarchyMember {
            contact_number: number,
            name: format!("Member {}", number),
            extra: extra
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
                .collect(),
        };
        let mut outcome = BatchOutcome::default();
        outcome.results.insert(10, vec![member(1, &[("email", "a@example.com")])]);
        outcome.results.insert(20, vec![member(2, &[("phone", "0123")])]);

        write_members_csv(&path, &outcome).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "unit,contact_number,name,email,phone");
        assert_eq!(lines[1], "10,1,Member 1,a@example.com,");
        assert_eq!(lines[2], "20,2,Member 2,,0123");
    }
}
