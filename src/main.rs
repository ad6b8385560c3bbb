use clap::Parser;
use log::error;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;

use compass_interface_core::batch::{BatchOutcome, member_roles, unit_members};
use compass_interface_core::hierarchy::Hierarchy;
use compass_interface_core::people::People;
use compass_interface_core::reports::Reports;
use compass_interface_core::ui::cli::{Args, Command};
use compass_interface_core::ui::output;
use compass_interface_core::{CompassError, Logon, Result, Settings};

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(args) {
        error!("{}", err);
        eprintln!("❌ {}", err);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let settings = Settings::load(args.config.as_deref())?;
    let logon = Logon::login(
        settings,
        (args.username.as_str(), args.password.as_str()),
        args.role.as_deref(),
        args.location.as_deref(),
    )?;
    if !args.json {
        output::print_session_summary(&logon, args.threads_num);
    }

    let people = People::new(&logon);
    let hierarchy = Hierarchy::new(&logon);

    match args.command {
        Command::Member { membership_number } => {
            let details = people.personal(membership_number)?;
            if args.json {
                output::print_json(&details)?;
            } else {
                output::print_member(&details);
            }
        }
        Command::Roles {
            membership_numbers,
            all_roles,
            statuses,
            details,
            csv,
        } => {
            if details {
                let &[membership_number] = membership_numbers.as_slice() else {
                    return Err(CompassError::Config(
                        "--details works with a single membership number".to_string(),
                    ));
                };
                let (roles, popups) = people.roles_with_details(membership_number, all_roles)?;
                if args.json {
                    output::print_json(&(roles, popups))?;
                } else {
                    output::print_roles(membership_number, &roles);
                    popups.iter().for_each(output::print_role_detail);
                }
                return Ok(());
            }

            let statuses: Option<BTreeSet<_>> =
                (!statuses.is_empty()).then(|| statuses.into_iter().collect());
            let outcome = if all_roles || statuses.is_some() {
                // Filtered requests go one by one so the filters apply
                let mut outcome = BatchOutcome::default();
                for number in membership_numbers {
                    match people.roles(number, all_roles, statuses.as_ref()) {
                        Ok(roles) => {
                            outcome.results.insert(number, roles);
                        }
                        Err(err) => outcome.skipped.push((number, err.to_string())),
                    }
                }
                outcome
            } else {
                member_roles(&people, membership_numbers, args.threads_num)
            };

            if args.json {
                output::print_json(&outcome.results)?;
            } else {
                for (number, roles) in &outcome.results {
                    output::print_roles(*number, roles);
                }
            }
            if let Some(path) = csv {
                output::write_roles_csv(&path, &outcome)?;
            }
            output::print_skipped(&outcome.skipped);
        }
        Command::Permits { membership_number } => {
            let permits = people.permits(membership_number)?;
            if args.json {
                output::print_json(&permits)?;
            } else {
                output::print_permits(membership_number, &permits);
            }
        }
        Command::Training {
            membership_number,
            mandatory,
        } => {
            if mandatory {
                let learning = people.mandatory_training(membership_number)?;
                if args.json {
                    output::print_json(&learning)?;
                } else {
                    output::print_mandatory_training(membership_number, &learning);
                }
            } else {
                let training = people.training(membership_number)?;
                if args.json {
                    output::print_json(&training)?;
                } else {
                    output::print_training(membership_number, &training);
                }
            }
        }
        Command::Awards { membership_number } => {
            let awards = people.awards(membership_number)?;
            if args.json {
                output::print_json(&awards)?;
            } else {
                output::print_awards(membership_number, &awards);
            }
        }
        Command::Disclosures {
            membership_number,
            latest,
        } => {
            let disclosures = if latest {
                people
                    .latest_disclosure(membership_number)?
                    .into_iter()
                    .collect()
            } else {
                people.disclosures(membership_number)?
            };
            if args.json {
                output::print_json(&disclosures)?;
            } else {
                output::print_disclosures(membership_number, &disclosures);
            }
        }
        Command::RoleDetail { role_number } => {
            let popup = people.role_detail(role_number)?;
            if args.json {
                output::print_json(&popup)?;
            } else {
                output::print_role_detail(&popup);
            }
        }
        Command::Units {
            parent_unit,
            endpoint,
        } => {
            let units = hierarchy.units(parent_unit, endpoint)?;
            if args.json {
                output::print_json(&units)?;
            } else {
                output::print_units(parent_unit, &units);
            }
        }
        Command::Hierarchy { unit, level } => {
            let tree = hierarchy.tree(unit, level)?;
            if args.json {
                output::print_json(&tree)?;
            } else {
                output::print_tree(&tree);
            }
        }
        Command::Members { units, csv } => {
            let outcome = unit_members(&hierarchy, units);
            if args.json {
                output::print_json(&outcome.results)?;
            } else {
                output::print_unit_members(&outcome);
            }
            if let Some(path) = csv {
                output::write_members_csv(&path, &outcome)?;
            }
            output::print_skipped(&outcome.skipped);
        }
        Command::Report {
            report_type,
            output: path,
        } => {
            let reports = Reports::new(&logon);
            let report = reports.get_report(report_type)?;
            let path = path.unwrap_or_else(|| PathBuf::from(reports.report_filename()));
            output::write_report(&path, &report)?;
        }
    }

    log::debug!(
        "Sent {} requests to Compass",
        logon.client().total_requests()
    );
    Ok(())
}
