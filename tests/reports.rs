mod common;

use common::*;
use compass_interface_core::CompassError;
use compass_interface_core::reports::{ReportType, Reports};

fn reports(compass: &FakeCompass) -> Reports {
    Reports::new(&compass.login())
}

#[test]
fn report_is_exported_as_csv() {
    let compass = FakeCompass::start();
    let report = reports(&compass).get_report(ReportType::MemberDirectory).unwrap();
    assert_eq!(String::from_utf8(report).unwrap(), REPORT_CSV);

    // The token request registers its hash first
    assert_eq!(compass.with_state(|s| s.preflights), 1);
}

#[test]
fn post_back_selects_every_location() {
    let compass = FakeCompass::start();
    reports(&compass).get_report(ReportType::MemberDirectory).unwrap();

    let posts = compass.with_state(|s| s.report_posts.clone());
    assert_eq!(posts.len(), 1);
    let form = &posts[0];
    let field = |name: &str| form.get(name).map(String::as_str);
    assert_eq!(field("__ASYNCPOST"), Some("true"));
    assert_eq!(field("__EVENTTARGET"), Some(""));
    assert_eq!(field("__VIEWSTATE"), Some("/wEPDwULLTE2"));
    assert_eq!(
        field("ReportViewer1$ctl04$ctl07$divDropDown$ctl01$HiddenIndices"),
        Some("0,1")
    );
    assert_eq!(field("ReportViewer1$ctl04$ctl07$txtValue"), Some("Hampshire, Dorset"));
    assert_eq!(field("ReportViewer1$ctl04$ctl05$txtValue"), Some("Wessex"));
    // Submit buttons aren't part of the post-back
    assert_eq!(field("ReportViewer1$ctl04$ctl00"), None);
}

#[test]
fn missing_permission_is_reported() {
    let compass = FakeCompass::start();
    let err = reports(&compass)
        .get_report(ReportType::Appointments)
        .unwrap_err();
    assert!(matches!(
        err,
        CompassError::ReportPermission(ref msg) if msg == "Report aborted: USER DOES NOT HAVE PERMISSION"
    ));
}

#[test]
fn expired_session_aborts_the_report() {
    let compass = FakeCompass::start();
    let err = reports(&compass)
        .get_report(ReportType::Disclosure)
        .unwrap_err();
    assert!(matches!(err, CompassError::Report(ref msg) if msg == "Report aborted: SESSION Expired"));
}

#[test]
fn error_page_after_post_back() {
    let compass = FakeCompass::start();
    let err = reports(&compass)
        .get_report(ReportType::Training)
        .unwrap_err();
    assert!(matches!(err, CompassError::Report(ref msg) if msg == "Compass Error!"));
}

#[test]
fn default_file_name_names_the_role() {
    let compass = FakeCompass::start();
    let name = reports(&compass).report_filename();
    assert!(name.ends_with(" - 10000000 (Regional Administrator - Wessex).csv"));
}
