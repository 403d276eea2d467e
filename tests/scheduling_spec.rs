use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::{Days, NaiveDate};
use rollcall::calendar::WeekStart;
use rollcall::db::Database;
use rollcall::error::{ConflictError, Error, IntegrityError, ValidationError};
use rollcall::models::*;
use rollcall::roster::{OpenRoster, RosterGate, StaticRoster};
use rollcall::scheduling::{Scheduler, SchedulingSettings};
use rollcall::store::{Collection, Expected, RecordStore, RecordStoreExt};
use speculate2::speculate;
use uuid::Uuid;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("bad test date")
}

fn scheduler_with(db: &Database, roster: Arc<dyn RosterGate>, settings: SchedulingSettings) -> Scheduler {
    Scheduler::new(Arc::new(db.clone()), roster, settings)
}

fn coach() -> Actor {
    Actor::new("coach-1", Role::LeadCoach)
}

fn blueprint(name: &str, day_of_week: u8, start: &str, end: &str, athletes: &[&str]) -> BlueprintInput {
    BlueprintInput {
        id: None,
        name: name.to_string(),
        day_of_week,
        start_time: start.to_string(),
        end_time: end.to_string(),
        max_capacity: 2,
        assigned_athlete_ids: athletes.iter().map(|a| a.to_string()).collect(),
        excluded_dates: BTreeSet::new(),
    }
}

fn monday_template(scheduler: &Scheduler) -> SessionTemplate {
    scheduler
        .create_template(&coach(), CreateTemplateInput {
            name: "Monday squad".to_string(),
            description: String::new(),
            blueprints: vec![blueprint("Morning drills", 1, "09:00", "10:00", &["A", "B"])],
        })
        .expect("Failed to create template")
}

fn materialize(scheduler: &Scheduler, template_id: Uuid, week: &str) -> rollcall::Result<SessionSchedule> {
    scheduler.materialize_week(&coach(), MaterializeWeekInput {
        template_id,
        week_start_date: date(week),
        on_conflict: ConflictPolicy::Fail,
    })
}

fn record(
    scheduler: &Scheduler,
    instance: &SessionInstance,
    athlete: &str,
    status: AttendanceStatus,
) -> rollcall::Result<AttendanceRecord> {
    scheduler.record_attendance(&coach(), RecordAttendanceInput {
        session_instance_id: instance.id,
        athlete_id: athlete.to_string(),
        date: instance.date,
        status,
        notes: None,
        expected_updated_at: None,
    })
}

fn retime(scheduler: &Scheduler, template: &SessionTemplate, start: &str, end: &str) -> SessionTemplate {
    let existing = &template.blueprints[0];
    scheduler
        .update_template(&coach(), template.id, UpdateTemplateInput {
            blueprints: Some(vec![BlueprintInput {
                id: Some(existing.id),
                ..blueprint(&existing.name, existing.day_of_week, start, end, &["A", "B"])
            }]),
            ..UpdateTemplateInput::default()
        })
        .expect("Failed to update template")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let scheduler = scheduler_with(&db, Arc::new(OpenRoster), SchedulingSettings::default());
    }

    describe "materialize_week" {
        it "places a Monday blueprint on the week's Monday with a roster snapshot" {
            let template = monday_template(&scheduler);

            let schedule = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");

            assert_eq!(schedule.sessions.len(), 1);
            let session = &schedule.sessions[0];
            assert_eq!(session.date, date("2024-03-04"));
            assert_eq!(session.athlete_ids, vec!["A".to_string(), "B".to_string()]);
            assert_eq!(session.start_time.to_string(), "09:00");
        }

        it "skips excluded dates" {
            let mut input = blueprint("Morning drills", 1, "09:00", "10:00", &["A"]);
            input.excluded_dates.insert(date("2024-03-11"));
            let template = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Monday squad".to_string(),
                description: String::new(),
                blueprints: vec![input],
            }).expect("Failed to create template");

            let excluded = materialize(&scheduler, template.id, "2024-03-11").expect("Materialize failed");
            let regular = materialize(&scheduler, template.id, "2024-03-18").expect("Materialize failed");

            assert!(excluded.sessions.is_empty());
            assert_eq!(regular.sessions.len(), 1);
        }

        it "orders sessions by date then start time" {
            let template = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Full week".to_string(),
                description: String::new(),
                blueprints: vec![
                    blueprint("Sunday match", 0, "10:00", "12:00", &[]),
                    blueprint("Tuesday evening", 2, "18:00", "19:00", &[]),
                    blueprint("Tuesday morning", 2, "7:30", "8:30", &[]),
                ],
            }).expect("Failed to create template");

            let schedule = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");

            let names: Vec<_> = schedule.sessions.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["Tuesday morning", "Tuesday evening", "Sunday match"]);
            assert_eq!(schedule.sessions[2].date, date("2024-03-10"));
        }

        it "is idempotent" {
            let template = monday_template(&scheduler);

            let first = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");
            let second = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");

            assert_eq!(first, second);
            assert_eq!(db.count(Collection::Schedules).unwrap(), 1);
            assert_eq!(db.count(Collection::Instances).unwrap(), 1);
        }

        it "gives each week its own instance ids" {
            let template = monday_template(&scheduler);

            let a = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");
            let b = materialize(&scheduler, template.id, "2024-03-11").expect("Materialize failed");

            assert_ne!(a.sessions[0].id, b.sessions[0].id);
            assert_eq!(scheduler.list_schedules(None).unwrap().len(), 2);
            assert_eq!(scheduler.list_schedules(Some(date("2024-03-11"))).unwrap().len(), 1);
        }

        it "rejects dates that are not a week start" {
            let template = monday_template(&scheduler);

            let err = materialize(&scheduler, template.id, "2024-03-05").unwrap_err();

            assert!(matches!(err, Error::Validation(ValidationError::NotWeekStart { .. })));
            assert_eq!(db.count(Collection::Schedules).unwrap(), 0);
        }

        it "rejects unknown and archived templates" {
            let unknown = materialize(&scheduler, Uuid::new_v4(), "2024-03-04").unwrap_err();
            assert!(matches!(unknown, Error::InvalidTemplate { .. }));

            let template = monday_template(&scheduler);
            scheduler.archive_template(template.id).expect("Archive failed");
            let archived = materialize(&scheduler, template.id, "2024-03-04").unwrap_err();
            assert!(matches!(archived, Error::InvalidTemplate { .. }));
        }

        it "does not let later template edits reach materialized weeks" {
            let template = monday_template(&scheduler);
            let before = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");

            retime(&scheduler, &template, "11:00", "12:00");

            let stored = scheduler.get_schedule(template.id, date("2024-03-04")).expect("Lookup failed");
            assert_eq!(stored, before);
        }

        it "serializes concurrent materializations of the same week" {
            let template = monday_template(&scheduler);

            let handles: Vec<_> = (0..8).map(|_| {
                let scheduler = scheduler.clone();
                let template_id = template.id;
                thread::spawn(move || materialize(&scheduler, template_id, "2024-03-04"))
            }).collect();
            let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("thread panicked")).collect();

            let ids: BTreeSet<_> = results.into_iter()
                .map(|r| r.expect("Materialize failed").sessions[0].id)
                .collect();
            assert_eq!(ids.len(), 1);
            assert_eq!(db.count(Collection::Instances).unwrap(), 1);
        }

        it "refuses blueprint ids owned by another template" {
            let first = monday_template(&scheduler);
            let owned_id = first.blueprints[0].id;
            let session = materialize(&scheduler, first.id, "2024-03-04").expect("Materialize failed").sessions[0].clone();
            record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            let borrowed = BlueprintInput {
                id: Some(owned_id),
                ..blueprint("Early drills", 1, "07:00", "08:00", &["A"])
            };

            let err = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Early squad".to_string(),
                description: String::new(),
                blueprints: vec![borrowed.clone()],
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::ForeignBlueprint(id)) if id == owned_id));

            let second = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Early squad".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Early drills", 1, "07:00", "08:00", &["A"])],
            }).expect("Failed to create template");
            let err = scheduler.update_template(&coach(), second.id, UpdateTemplateInput {
                blueprints: Some(vec![borrowed]),
                ..UpdateTemplateInput::default()
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::ForeignBlueprint(_))));

            // A stored template that already shares the id still cannot take the instance over
            let mut shared = second.clone();
            shared.blueprints[0].id = owned_id;
            db.save(&shared, Expected::Any).expect("Save failed");

            let err = materialize(&scheduler, second.id, "2024-03-04").unwrap_err();
            assert!(matches!(err, Error::Conflict(ConflictError::InstanceTaken { session_instance_id, .. }) if session_instance_id == session.id));
            assert_eq!(scheduler.get_instance(session.id).expect("Instance missing"), session);
            assert!(matches!(
                scheduler.get_schedule(second.id, date("2024-03-04")).unwrap_err(),
                Error::NotFound { .. }
            ));
        }

        it "rejects weeks that run past the end of the calendar" {
            // Pick the convention under which the last representable date is not a week's last day
            let (week_start, last_day) = if WeekStart::Sunday.is_week_start(NaiveDate::MAX) {
                (WeekStart::Sunday, 6)
            } else {
                (WeekStart::Monday, 0)
            };
            let scheduler = scheduler_with(&db, Arc::new(OpenRoster), SchedulingSettings {
                week_start,
                ..SchedulingSettings::default()
            });
            let template = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Week closer".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Last day", last_day, "09:00", "10:00", &[])],
            }).expect("Failed to create template");
            let week = scheduler.week_start_for(NaiveDate::MAX).expect("Week start failed");

            let err = scheduler.materialize_week(&coach(), MaterializeWeekInput {
                template_id: template.id,
                week_start_date: week,
                on_conflict: ConflictPolicy::Fail,
            }).unwrap_err();

            assert!(matches!(err, Error::Validation(ValidationError::DateOutOfRange(_))));
            assert!(scheduler.list_schedules(None).unwrap().is_empty());
        }
    }

    describe "re-materializing a week with attendance" {
        before {
            let template = monday_template(&scheduler);
            let schedule = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");
            let session = schedule.sessions[0].clone();
            record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
        }

        it "reports a conflict when the blueprint's time changed" {
            retime(&scheduler, &template, "10:00", "11:00");

            let err = materialize(&scheduler, template.id, "2024-03-04").unwrap_err();

            match err {
                Error::Conflict(ConflictError::Reconciliation { conflicts, .. }) => {
                    assert_eq!(conflicts.len(), 1);
                    assert_eq!(conflicts[0].session_instance_id, session.id);
                    assert_eq!(conflicts[0].attendance_records, 1);
                    assert!(conflicts[0].changed_fields.contains(&InstanceField::StartTime));
                }
                other => panic!("expected reconciliation conflict, got {:?}", other),
            }
            let stored = scheduler.get_instance(session.id).expect("Lookup failed");
            assert_eq!(stored, session);
        }

        it "keeps the recorded instance untouched when asked to" {
            retime(&scheduler, &template, "10:00", "11:00");

            let schedule = scheduler.materialize_week(&coach(), MaterializeWeekInput {
                template_id: template.id,
                week_start_date: date("2024-03-04"),
                on_conflict: ConflictPolicy::KeepRecorded,
            }).expect("Materialize failed");

            assert_eq!(schedule.sessions, vec![session.clone()]);
            let records = scheduler.get_attendance(&coach(), &AttendanceFilter::for_instance(session.id))
                .expect("Query failed");
            assert_eq!(records.len(), 1);
        }

        it "never drops a recorded instance when its blueprint is removed" {
            scheduler.update_template(&coach(), template.id, UpdateTemplateInput {
                blueprints: Some(vec![blueprint("Friday recovery", 5, "17:00", "18:00", &["A"])]),
                ..UpdateTemplateInput::default()
            }).expect("Failed to update template");

            let err = materialize(&scheduler, template.id, "2024-03-04").unwrap_err();
            assert!(matches!(err, Error::Conflict(ConflictError::Reconciliation { .. })));

            let schedule = scheduler.materialize_week(&coach(), MaterializeWeekInput {
                template_id: template.id,
                week_start_date: date("2024-03-04"),
                on_conflict: ConflictPolicy::KeepRecorded,
            }).expect("Materialize failed");

            let ids: Vec<_> = schedule.sessions.iter().map(|s| s.id).collect();
            assert_eq!(schedule.sessions.len(), 2);
            assert!(ids.contains(&session.id));
            assert_eq!(schedule.sessions[0].date, date("2024-03-04"));
            assert_eq!(schedule.sessions[1].date, date("2024-03-08"));
        }

        it "is a no-op when nothing changed" {
            let again = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed");
            assert_eq!(again, schedule);
        }
    }

    describe "record_attendance" {
        before {
            let template = monday_template(&scheduler);
            let session = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed")
                .sessions[0].clone();
        }

        it "upserts a single record per athlete and date" {
            let first = record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            let second = record(&scheduler, &session, "A", AttendanceStatus::Late).expect("Record failed");

            let records = scheduler.get_attendance(&coach(), &AttendanceFilter::for_athlete("A"))
                .expect("Query failed");
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].status, AttendanceStatus::Late);
            assert_eq!(second.id, first.id);
            assert_eq!(second.created_at, first.created_at);
            assert!(second.updated_at >= first.updated_at);
        }

        it "accepts athletes outside the roster snapshot" {
            record(&scheduler, &session, "Z", AttendanceStatus::Present).expect("Record failed");

            let sheet = scheduler.session_sheet(&coach(), session.id).expect("Sheet failed");
            let walk_in = sheet.entries.iter().find(|e| e.athlete_id == "Z").expect("missing walk-in");
            assert!(!walk_in.rostered);
            assert_eq!(sheet.entries.len(), 3);
            assert!(sheet.entries.iter().find(|e| e.athlete_id == "B").unwrap().status.is_none());
        }

        it "trims notes and drops blank ones" {
            let saved = scheduler.record_attendance(&coach(), RecordAttendanceInput {
                session_instance_id: session.id,
                athlete_id: "A".to_string(),
                date: session.date,
                status: AttendanceStatus::Absent,
                notes: Some("   ".to_string()),
                expected_updated_at: None,
            }).expect("Record failed");
            assert!(saved.notes.is_none());
        }

        it "rejects unknown sessions" {
            let err = scheduler.record_attendance(&coach(), RecordAttendanceInput {
                session_instance_id: Uuid::new_v4(),
                athlete_id: "A".to_string(),
                date: session.date,
                status: AttendanceStatus::Present,
                notes: None,
                expected_updated_at: None,
            }).unwrap_err();
            assert!(matches!(err, Error::UnknownSessionInstance(_)));
        }

        it "rejects a date other than the session's" {
            let err = scheduler.record_attendance(&coach(), RecordAttendanceInput {
                session_instance_id: session.id,
                athlete_id: "A".to_string(),
                date: date("2024-03-05"),
                status: AttendanceStatus::Present,
                notes: None,
                expected_updated_at: None,
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::DateMismatch { .. })));
        }

        it "rejects writes based on a stale read" {
            let first = record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            record(&scheduler, &session, "A", AttendanceStatus::Late).expect("Record failed");

            let err = scheduler.record_attendance(&coach(), RecordAttendanceInput {
                session_instance_id: session.id,
                athlete_id: "A".to_string(),
                date: session.date,
                status: AttendanceStatus::Absent,
                notes: None,
                expected_updated_at: Some(first.updated_at),
            }).unwrap_err();

            assert!(matches!(err, Error::Conflict(ConflictError::ConcurrentUpdate { .. })));
            let records = scheduler.get_attendance(&coach(), &AttendanceFilter::for_instance(session.id))
                .expect("Query failed");
            assert_eq!(records[0].status, AttendanceStatus::Late);
        }

        it "lets concurrent writers to different athletes all succeed" {
            let handles: Vec<_> = ["A", "B", "C", "D"].into_iter().map(|athlete| {
                let scheduler = scheduler.clone();
                let session = session.clone();
                thread::spawn(move || record(&scheduler, &session, athlete, AttendanceStatus::Present))
            }).collect();
            for handle in handles {
                handle.join().expect("thread panicked").expect("Record failed");
            }

            let records = scheduler.get_attendance(&coach(), &AttendanceFilter::for_instance(session.id))
                .expect("Query failed");
            assert_eq!(records.len(), 4);
        }
    }

    describe "attendance_stats" {
        it "counts statuses over fifteen weeks" {
            let template = monday_template(&scheduler);
            let mut week = date("2024-01-01");
            let mut sessions = Vec::new();
            for _ in 0..15 {
                let schedule = materialize(&scheduler, template.id, &week.to_string()).expect("Materialize failed");
                sessions.push(schedule.sessions[0].clone());
                week = week + Days::new(7);
            }
            for (i, session) in sessions.iter().enumerate() {
                let status = match i {
                    0..=9 => AttendanceStatus::Present,
                    10..=11 => AttendanceStatus::Late,
                    _ => AttendanceStatus::Absent,
                };
                record(&scheduler, session, "A", status).expect("Record failed");
            }

            let stats = scheduler.attendance_stats(&coach(), "A", None).expect("Stats failed");

            assert_eq!(stats.total_sessions, 15);
            assert_eq!(stats.attended_sessions, 10);
            assert_eq!(stats.late_sessions, 2);
            assert_eq!(stats.missed_sessions, 3);
            assert!((stats.attendance_rate - 66.67).abs() < 0.01);
            assert_eq!(stats.rate_label(), "66.7%");
            assert_eq!(stats.recent_attendance.len(), 10);
            assert_eq!(stats.recent_attendance[0].date, sessions[14].date);
            assert_eq!(stats.recent_attendance[0].session, sessions[14]);
            assert!(stats.recent_attendance.windows(2).all(|w| w[0].date >= w[1].date));
        }

        it "reports zero for athletes without records" {
            let stats = scheduler.attendance_stats(&coach(), "nobody", None).expect("Stats failed");
            assert_eq!(stats.total_sessions, 0);
            assert_eq!(stats.attendance_rate, 0.0);
            assert!(stats.recent_attendance.is_empty());
        }

        it "honours as_of" {
            let template = monday_template(&scheduler);
            for week in ["2024-03-04", "2024-03-11"] {
                let session = materialize(&scheduler, template.id, week).expect("Materialize failed").sessions[0].clone();
                record(&scheduler, &session, "A", AttendanceStatus::Absent).expect("Record failed");
            }

            let stats = scheduler.attendance_stats(&coach(), "A", Some(date("2024-03-10"))).expect("Stats failed");
            assert_eq!(stats.total_sessions, 1);
        }

        it "fails loudly when a record's session is gone" {
            let template = monday_template(&scheduler);
            let session = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed").sessions[0].clone();
            record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            db.delete(Collection::Instances, &session.id.to_string()).expect("Delete failed");

            let err = scheduler.attendance_stats(&coach(), "A", None).unwrap_err();
            assert!(matches!(err, Error::Integrity(IntegrityError::DanglingInstance { .. })));
        }

        it "respects a configured recent limit" {
            let scheduler = scheduler_with(&db, Arc::new(OpenRoster), SchedulingSettings {
                recent_limit: 1,
                ..SchedulingSettings::default()
            });
            let template = monday_template(&scheduler);
            for week in ["2024-03-04", "2024-03-11"] {
                let session = materialize(&scheduler, template.id, week).expect("Materialize failed").sessions[0].clone();
                record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            }

            let stats = scheduler.attendance_stats(&coach(), "A", None).expect("Stats failed");
            assert_eq!(stats.total_sessions, 2);
            assert_eq!(stats.recent_attendance.len(), 1);
            assert_eq!(stats.recent_attendance[0].date, date("2024-03-11"));
        }
    }

    describe "roster visibility" {
        before {
            let roster = StaticRoster::new().assign("coach-2", "A");
            let scheduler = scheduler_with(&db, Arc::new(roster), SchedulingSettings::default());
            let assistant = Actor::new("coach-2", Role::AcademyCoach);
        }

        it "rejects assigning athletes the caller cannot see" {
            let err = scheduler.create_template(&assistant, CreateTemplateInput {
                name: "Private group".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Drills", 1, "09:00", "10:00", &["A", "B"])],
            }).unwrap_err();

            assert!(matches!(err, Error::AthleteNotVisible { ref athlete_id, .. } if athlete_id == "B"));
        }

        it "hides other athletes' attendance and stats" {
            let template = monday_template(&scheduler);
            let session = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed").sessions[0].clone();
            record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            record(&scheduler, &session, "B", AttendanceStatus::Present).expect("Record failed");

            let visible = scheduler.get_attendance(&assistant, &AttendanceFilter::for_instance(session.id))
                .expect("Query failed");
            assert_eq!(visible.len(), 1);
            assert_eq!(visible[0].athlete_id, "A");

            let err = scheduler.attendance_stats(&assistant, "B", None).unwrap_err();
            assert!(matches!(err, Error::AthleteNotVisible { .. }));

            let err = scheduler.record_attendance(&assistant, RecordAttendanceInput {
                session_instance_id: session.id,
                athlete_id: "B".to_string(),
                date: session.date,
                status: AttendanceStatus::Late,
                notes: None,
                expected_updated_at: None,
            }).unwrap_err();
            assert!(matches!(err, Error::AthleteNotVisible { .. }));
        }
    }

    describe "templates" {
        it "validates input before saving" {
            let err = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "X".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Drills", 1, "09:00", "10:00", &[])],
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::TooShort { .. })));

            let err = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Crowded".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Drills", 1, "09:00", "10:00", &["A", "B", "C"])],
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(ValidationError::CapacityExceeded { .. })));

            assert!(scheduler.list_templates(true).unwrap().is_empty());
        }

        it "lists active templates by name and hides archived ones" {
            let zulu = scheduler.create_template(&coach(), CreateTemplateInput {
                name: "Zulu".to_string(),
                description: String::new(),
                blueprints: vec![blueprint("Drills", 1, "09:00", "10:00", &[])],
            }).expect("Failed to create template");
            monday_template(&scheduler);
            scheduler.archive_template(zulu.id).expect("Archive failed");

            let active: Vec<_> = scheduler.list_templates(false).unwrap().into_iter().map(|t| t.name).collect();
            assert_eq!(active, vec!["Monday squad".to_string()]);
            assert_eq!(scheduler.list_templates(true).unwrap().len(), 2);
        }

        it "keeps supplied blueprint ids on update" {
            let template = monday_template(&scheduler);
            let updated = retime(&scheduler, &template, "08:00", "09:30");

            assert_eq!(updated.blueprints[0].id, template.blueprints[0].id);
            assert_eq!(updated.blueprints[0].start_time.to_string(), "08:00");
            assert!(updated.updated_at >= template.updated_at);
        }
    }

    describe "week_overview" {
        it "collects schedules and attendance for the week" {
            let template = monday_template(&scheduler);
            let session = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed").sessions[0].clone();
            materialize(&scheduler, template.id, "2024-03-11").expect("Materialize failed");
            record(&scheduler, &session, "A", AttendanceStatus::Late).expect("Record failed");

            let overview = scheduler.week_overview(&coach(), date("2024-03-04")).expect("Overview failed");

            assert_eq!(overview.schedules.len(), 1);
            assert_eq!(overview.attendance.len(), 1);
            assert_eq!(overview.attendance[0].status, AttendanceStatus::Late);
        }
    }

    describe "feedback" {
        before {
            let template = monday_template(&scheduler);
            let session = materialize(&scheduler, template.id, "2024-03-04").expect("Materialize failed").sessions[0].clone();
            let content = FeedbackContent {
                main_focus: "Serve return".to_string(),
                drills: vec!["Cross-court rally".to_string()],
                ..FeedbackContent::default()
            };
        }

        it "replaces content while keeping identity" {
            let first = scheduler.record_feedback(&coach(), session.id, content.clone()).expect("Feedback failed");
            let second = scheduler.record_feedback(&coach(), session.id, FeedbackContent {
                main_focus: "Footwork".to_string(),
                ..content.clone()
            }).expect("Feedback failed");

            assert_eq!(second.id, first.id);
            assert_eq!(second.created_at, first.created_at);
            assert_eq!(scheduler.get_feedback(session.id).unwrap().content.main_focus, "Footwork");
        }

        it "builds a training log from attended sessions only" {
            scheduler.record_feedback(&coach(), session.id, content.clone()).expect("Feedback failed");
            record(&scheduler, &session, "A", AttendanceStatus::Late).expect("Record failed");
            record(&scheduler, &session, "B", AttendanceStatus::Absent).expect("Record failed");

            let log_a = scheduler.training_log(&coach(), "A").expect("Log failed");
            let log_b = scheduler.training_log(&coach(), "B").expect("Log failed");

            assert_eq!(log_a.len(), 1);
            assert_eq!(log_a[0].session_name, "Morning drills");
            assert_eq!(log_a[0].feedback.main_focus, "Serve return");
            assert!(log_b.is_empty());
        }

        it "fails loudly when an attended session is gone" {
            scheduler.record_feedback(&coach(), session.id, content.clone()).expect("Feedback failed");
            record(&scheduler, &session, "A", AttendanceStatus::Present).expect("Record failed");
            db.delete(Collection::Instances, &session.id.to_string()).expect("Delete failed");

            let err = scheduler.training_log(&coach(), "A").unwrap_err();
            assert!(matches!(err, Error::Integrity(IntegrityError::DanglingInstance { .. })));
        }

        it "seeds feedback from a template and keeps attached media" {
            scheduler.record_feedback(&coach(), session.id, FeedbackContent {
                media: vec!["https://media.example/rally.mp4".to_string()],
                ..content.clone()
            }).expect("Feedback failed");
            let template = scheduler.create_feedback_template(&coach(), CreateFeedbackTemplateInput {
                name: "Serve day".to_string(),
                main_focus: "Serve development".to_string(),
                drills: vec!["Target serves".to_string()],
                ..CreateFeedbackTemplateInput::default()
            }).expect("Failed to create feedback template");

            let seeded = scheduler.apply_feedback_template(&coach(), session.id, template.id).expect("Apply failed");

            assert_eq!(seeded.content.main_focus, "Serve development");
            assert_eq!(seeded.content.drills, vec!["Target serves".to_string()]);
            assert_eq!(seeded.content.media, vec!["https://media.example/rally.mp4".to_string()]);

            scheduler.delete_feedback_template(template.id).expect("Delete failed");
            assert_eq!(scheduler.get_feedback(session.id).unwrap().content.main_focus, "Serve development");
            let err = scheduler.apply_feedback_template(&coach(), session.id, template.id).unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }));
        }

        it "lists feedback templates by name" {
            for name in ["Volleys", "Footwork"] {
                scheduler.create_feedback_template(&coach(), CreateFeedbackTemplateInput {
                    name: name.to_string(),
                    main_focus: format!("{} basics", name),
                    ..CreateFeedbackTemplateInput::default()
                }).expect("Failed to create feedback template");
            }

            let names: Vec<_> = scheduler.list_feedback_templates().unwrap().into_iter().map(|t| t.name).collect();
            assert_eq!(names, vec!["Footwork".to_string(), "Volleys".to_string()]);

            let err = scheduler.delete_feedback_template(Uuid::new_v4()).unwrap_err();
            assert!(matches!(err, Error::NotFound { .. }));
        }

        it "rejects feedback for unknown sessions" {
            let err = scheduler.record_feedback(&coach(), Uuid::new_v4(), content.clone()).unwrap_err();
            assert!(matches!(err, Error::UnknownSessionInstance(_)));
        }
    }

    describe "sunday weeks" {
        it "maps day_of_week as an offset from Sunday" {
            let scheduler = scheduler_with(&db, Arc::new(OpenRoster), SchedulingSettings {
                week_start: WeekStart::Sunday,
                ..SchedulingSettings::default()
            });
            let template = monday_template(&scheduler);

            let schedule = materialize(&scheduler, template.id, "2024-03-03").expect("Materialize failed");

            assert_eq!(schedule.sessions[0].date, date("2024-03-04"));
            assert_eq!(scheduler.week_start_for(date("2024-03-06")).unwrap(), date("2024-03-03"));
        }
    }
}
