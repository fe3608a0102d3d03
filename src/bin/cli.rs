use std::io::{self, Write};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};

use tracing_subscriber::EnvFilter;
use weekplan::persistence::{self, PlannerStore, SaveDebouncer};
use weekplan::{
    CellEntry, CellKey, Document, HolidayService, ImportMode, IsoWeek, Placement, Planner,
    PlannerConfig, StateCode, WeekView,
};

fn parse_day(s: &str) -> Option<u8> {
    match s.to_ascii_lowercase().as_str() {
        "mo" => Some(1),
        "di" | "tu" => Some(2),
        "mi" | "we" => Some(3),
        "do" | "th" => Some(4),
        "fr" => Some(5),
        other => other.parse::<u8>().ok().filter(|d| (1..=5).contains(d)),
    }
}

fn parse_slots(s: &str) -> Option<Vec<u8>> {
    s.split(',')
        .map(|p| p.trim().parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()
        .filter(|slots| !slots.is_empty())
}

fn rest(parts: std::str::SplitWhitespace<'_>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

fn render_week_table(view: &WeekView, doc: &Document) -> String {
    let mut header = vec![view.key.clone()];
    for (idx, day) in view.dates.days.iter().enumerate() {
        let mut label = day.format("%a %d.%m.").to_string();
        if view.day_locks[idx].is_some() {
            label.push_str(" *");
        }
        header.push(label);
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (slot, slot_label) in view.slot_labels.iter().enumerate() {
        let mut row = vec![slot_label.clone()];
        for day in 1..=5u8 {
            let text = CellKey::new(day, slot as u8)
                .and_then(|key| view.cells.get(&key.to_string()))
                .map(|entry| doc.entry_text(entry))
                .unwrap_or_default();
            row.push(text);
        }
        rows.push(row);
    }

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (ci, cell) in row.iter().enumerate() {
            widths[ci] = widths[ci].max(cell.chars().count());
        }
    }

    let mut sep = String::from("+");
    for w in &widths {
        sep.push_str(&"-".repeat(*w + 2));
        sep.push('+');
    }

    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for (ci, cell) in cells.iter().enumerate() {
            let pad = widths[ci].saturating_sub(cell.chars().count());
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
            line.push_str(" |");
        }
        line
    };

    let mut out = format!("Plan: {} ({})\n", view.plan_name, view.plan_id);
    out.push_str(&sep);
    out.push('\n');
    out.push_str(&render_row(&header));
    out.push('\n');
    out.push_str(&sep);
    out.push('\n');
    for row in &rows {
        out.push_str(&render_row(row));
        out.push('\n');
    }
    out.push_str(&sep);
    out.push('\n');
    for (idx, lock) in view.day_locks.iter().enumerate() {
        if let Some(name) = lock {
            out.push_str(&format!("* {} {name} (locked)\n", view.dates.days[idx]));
        }
    }
    if !view.note.is_empty() {
        out.push_str(&format!("Note: {}\n", view.note));
    }
    if !view.class_reps.is_empty() {
        out.push_str(&format!("Class reps: {}\n", view.class_reps));
    }
    if !view.qn_owner.is_empty() {
        out.push_str(&format!("QN: {}\n", view.qn_owner));
    }
    out
}

fn print_help() {
    println!(
        "Commands:\n  help                               Show this help\n  show                               Show the displayed week\n  week <YYYY-Www>|next|prev|today    Navigate\n  goto <year> <week>                 Navigate (week is clamped)\n  state <BE|BB>                      Switch federal state\n  set <day> <slots> subject <id> [teacher_id]\n                                     Fill cells (day 1-5 or mo..fr, slots like 0,1;\n                                     teacher defaults to the subject's)\n  set <day> <slots> special <id>     Fill cells with a special\n  clear <day> <slot>                 Empty one cell\n  clearweek                          Remove all data of the displayed week\n  note|reps|qn <text...>             Set week note / class reps / QN owner\n  teacher add <short> <name...>      Add a teacher\n  teacher del <id>                   Delete a teacher (references are cleared)\n  subject add <name...>              Add a subject\n  subject teacher <id> <teacher_id>  Set a subject's default teacher\n  subject del <id>                   Delete a subject and its cells\n  special add <title...>             Add a special\n  special del <id>                   Delete a special and its cells\n  list                               List teachers, subjects and specials\n  plan list|add <name...>|use <id>|rename <id> <name...>|del <id>|leader <id> <teacher_id|->\n  place <subject|special> <id>       Toggle placement mode\n  put <day> <slot>                   Apply the armed placement\n  label <slot> <text...>             Rename a block (blank resets)\n  holidays                           Show school holidays for the week\n  export <json|csv> <path>           Export document or week table\n  import <replace|merge> <path>      Import a JSON export\n  save                               Save now\n  quit|exit                          Save and exit"
    );
}

fn print_entities(doc: &Document) {
    println!("Teachers:");
    for t in &doc.teachers {
        println!("  {:<36} {:<6} {}", t.id, t.short, t.name);
    }
    println!("Subjects:");
    for s in &doc.subjects {
        println!("  {:<36} {:<8} {} {}", s.id, s.color, s.name, s.default_teacher_id);
    }
    println!("Specials:");
    for s in &doc.specials {
        println!("  {:<36} {:<8} {}", s.id, s.color, s.title);
    }
}

struct Session {
    planner: Planner,
    holidays: HolidayService,
    store: Box<dyn PlannerStore>,
    debouncer: SaveDebouncer,
}

enum Flow {
    Continue,
    Quit,
}

impl Session {
    async fn refresh_legal(&mut self) {
        let state = self.planner.view().state;
        let years = self.planner.displayed_years();
        let map = self.holidays.legal_map(state, &years).await;
        self.planner.apply_legal_map(state, &years, map);
        if let Err(err) = persistence::save_holiday_caches(self.store.as_ref(), &self.holidays) {
            println!("Could not store holiday cache: {err}");
        }
    }

    fn show(&mut self) {
        let view = self.planner.week_view();
        println!("{}", render_week_table(&view, self.planner.document()));
    }

    async fn navigate(&mut self, iso: IsoWeek) {
        self.planner.go_to(iso.year, i64::from(iso.week));
        self.refresh_legal().await;
        self.show();
    }

    fn save(&mut self) -> Result<(), persistence::PersistenceError> {
        self.planner.take_dirty();
        self.debouncer.flush();
        persistence::save_document(self.store.as_ref(), self.planner.document_for_save())
    }

    fn after_command(&mut self) {
        if self.planner.take_dirty() {
            self.debouncer.touch(Instant::now());
        }
    }

    /// Trailing save, fired by the idle timer once the debounce delay has passed.
    fn autosave(&mut self) {
        if !self.debouncer.take_due(Instant::now()) {
            return;
        }
        if let Err(err) =
            persistence::save_document(self.store.as_ref(), self.planner.document_for_save())
        {
            println!("Error saving: {err}");
        }
    }

    /// The subject's default teacher fills in when none is given.
    fn default_teacher(&self, subject_id: &str) -> String {
        self.planner
            .document()
            .subject(subject_id)
            .map(|subject| subject.default_teacher_id.clone())
            .unwrap_or_default()
    }

    async fn holidays(&mut self) {
        let state = self.planner.view().state;
        let iso = self.planner.view().iso;
        match self.holidays.school_overview(state, iso).await {
            Ok(overview) => {
                if overview.overlapping.is_empty() {
                    println!("No school holidays this week.");
                }
                for h in &overview.overlapping {
                    println!("This week: {} {}..{}", h.display_name(), h.start_date, h.end_date);
                }
                for h in &overview.upcoming {
                    println!("Upcoming:  {} {}..{}", h.display_name(), h.start_date, h.end_date);
                }
            }
            Err(err) => println!("Offline: couldn't load school holidays ({err})"),
        }
        for (date, name) in self.planner.legal_map().iter() {
            if self.planner.dates().day_index(*date).is_some() {
                println!("Public holiday: {date} {name}");
            }
        }
        if let Err(err) = persistence::save_holiday_caches(self.store.as_ref(), &self.holidays) {
            println!("Could not store holiday cache: {err}");
        }
    }

    async fn execute(&mut self, input: &str) -> Flow {
        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or("");

        match cmd {
            "help" => print_help(),
            "quit" | "exit" => return Flow::Quit,
            "show" => self.show(),
            "week" => match parts.next() {
                Some("next") => {
                    let iso = self.planner.view().iso.shifted(1);
                    self.navigate(iso).await;
                }
                Some("prev") => {
                    let iso = self.planner.view().iso.shifted(-1);
                    self.navigate(iso).await;
                }
                Some("today") => {
                    self.navigate(IsoWeek::containing(chrono::Local::now().date_naive())).await;
                }
                Some(key) => match key.parse::<IsoWeek>() {
                    Ok(iso) => self.navigate(iso).await,
                    Err(err) => println!("{err}"),
                },
                None => println!("Usage: week <YYYY-Www>|next|prev|today"),
            },
            "goto" => {
                let year = parts.next().and_then(|s| s.parse::<i32>().ok());
                let week = parts.next().and_then(|s| s.parse::<i64>().ok());
                match (year, week) {
                    (Some(year), Some(week)) => self.navigate(IsoWeek::new(year, week)).await,
                    _ => println!("Usage: goto <year> <week>"),
                }
            }
            "state" => match parts.next().and_then(StateCode::from_code) {
                Some(state) => {
                    self.planner.set_state(state);
                    self.refresh_legal().await;
                    println!("State set to {}.", state.display_name());
                }
                None => println!("Usage: state <BE|BB>"),
            },
            "set" => {
                let day = parts.next().and_then(parse_day);
                let slots = parts.next().and_then(parse_slots);
                let kind = parts.next();
                let id = parts.next();
                let teacher = parts.next();
                let entry = match (kind, id) {
                    (Some("subject"), Some(id)) => {
                        let teacher = teacher
                            .map(str::to_string)
                            .unwrap_or_else(|| self.default_teacher(id));
                        Some(CellEntry::subject(id).with_teacher(teacher))
                    }
                    (Some("special"), Some(id)) => {
                        Some(CellEntry::special(id).with_teacher(teacher.unwrap_or("")))
                    }
                    _ => None,
                };
                match (day, slots, entry) {
                    (Some(day), Some(slots), Some(entry)) => {
                        match self.planner.set_entries(day, &slots, &entry) {
                            Ok(()) => println!("Updated {} cell(s).", slots.len()),
                            Err(err) => println!("Rejected: {err}"),
                        }
                    }
                    _ => println!("Usage: set <day> <slots> <subject|special> <id> [teacher_id]"),
                }
            }
            "clear" => {
                let day = parts.next().and_then(parse_day);
                let slot = parts.next().and_then(|s| s.parse::<u8>().ok());
                match day.zip(slot).and_then(|(d, s)| CellKey::new(d, s)) {
                    Some(key) => match self.planner.set_entry(key, CellEntry::Empty) {
                        Ok(()) => println!("Cleared {key}."),
                        Err(err) => println!("Rejected: {err}"),
                    },
                    None => println!("Usage: clear <day> <slot>"),
                }
            }
            "clearweek" => match self.planner.clear_week() {
                Ok(true) => println!("Week cleared."),
                Ok(false) => println!("Nothing stored for this week."),
                Err(err) => println!("Error: {err}"),
            },
            "note" | "reps" | "qn" => {
                let text = rest(parts);
                let result = match cmd {
                    "note" => self.planner.set_note(&text),
                    "reps" => self.planner.set_class_reps(&text),
                    _ => self.planner.set_qn_owner(&text),
                };
                match result {
                    Ok(()) => println!("Saved {cmd}."),
                    Err(err) => println!("Error: {err}"),
                }
            }
            "teacher" => match parts.next() {
                Some("add") => {
                    let short = parts.next().unwrap_or("").to_string();
                    let name = rest(parts);
                    match self.planner.edit(|s| s.add_teacher(&name, &short)) {
                        Ok(id) => println!("Added teacher {id}."),
                        Err(err) => println!("Error: {err}"),
                    }
                }
                Some("del") => match parts.next() {
                    Some(id) => match self.planner.edit(|s| s.delete_teacher(id)) {
                        Ok(()) => println!("Deleted teacher {id}."),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: teacher del <id>"),
                },
                _ => println!("Usage: teacher add <short> <name...> | teacher del <id>"),
            },
            "subject" => match parts.next() {
                Some("add") => {
                    let name = rest(parts);
                    match self.planner.edit(|s| s.add_subject(&name, "", "")) {
                        Ok(id) => println!("Added subject {id}."),
                        Err(err) => println!("Error: {err}"),
                    }
                }
                Some("teacher") => match (parts.next(), parts.next()) {
                    (Some(id), Some(teacher_id)) => {
                        let current = self.planner.document().subject(id).cloned();
                        let result = match current {
                            Some(subject) => self.planner.edit(|s| {
                                s.update_subject(id, &subject.name, &subject.color, teacher_id)
                            }),
                            None => Err(weekplan::EditError::UnknownEntity {
                                kind: "subject",
                                id: id.to_string(),
                            }),
                        };
                        match result {
                            Ok(()) => println!("Updated subject {id}."),
                            Err(err) => println!("Error: {err}"),
                        }
                    }
                    _ => println!("Usage: subject teacher <id> <teacher_id>"),
                },
                Some("del") => match parts.next() {
                    Some(id) => match self.planner.edit(|s| s.delete_subject(id)) {
                        Ok(()) => println!("Deleted subject {id}."),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: subject del <id>"),
                },
                _ => println!("Usage: subject add <name...> | subject teacher <id> <teacher_id> | subject del <id>"),
            },
            "special" => match parts.next() {
                Some("add") => {
                    let title = rest(parts);
                    match self.planner.edit(|s| s.add_special(&title, "")) {
                        Ok(id) => println!("Added special {id}."),
                        Err(err) => println!("Error: {err}"),
                    }
                }
                Some("del") => match parts.next() {
                    Some(id) => match self.planner.edit(|s| s.delete_special(id)) {
                        Ok(()) => println!("Deleted special {id}."),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: special del <id>"),
                },
                _ => println!("Usage: special add <title...> | special del <id>"),
            },
            "list" => print_entities(self.planner.document()),
            "plan" => match parts.next() {
                Some("list") | None => {
                    let doc = self.planner.document();
                    for plan in doc.plans.values() {
                        let marker = if plan.id == doc.settings.active_plan_id { "*" } else { " " };
                        println!("{marker} {:<40} {}", plan.id, plan.name);
                    }
                }
                Some("add") => {
                    let name = rest(parts);
                    let id = self.planner.edit(|s| s.add_plan(&name));
                    println!("Added plan {id}.");
                }
                Some("use") => match parts.next() {
                    Some(id) => match self.planner.edit(|s| s.set_active_plan(id)) {
                        Ok(()) => self.show(),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: plan use <id>"),
                },
                Some("rename") => match parts.next() {
                    Some(id) => {
                        let id = id.to_string();
                        let name = rest(parts);
                        match self.planner.edit(|s| s.rename_plan(&id, &name)) {
                            Ok(()) => println!("Renamed plan {id}."),
                            Err(err) => println!("Error: {err}"),
                        }
                    }
                    None => println!("Usage: plan rename <id> <name...>"),
                },
                Some("del") => match parts.next() {
                    Some(id) => match self.planner.edit(|s| s.delete_plan(id)) {
                        Ok(()) => println!("Deleted plan {id}."),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: plan del <id>"),
                },
                Some("leader") => match (parts.next(), parts.next()) {
                    (Some(id), Some(teacher)) => {
                        let teacher = if teacher == "-" { "" } else { teacher };
                        match self.planner.edit(|s| s.set_plan_leader(id, teacher)) {
                            Ok(()) => println!("Updated leader of {id}."),
                            Err(err) => println!("Error: {err}"),
                        }
                    }
                    _ => println!("Usage: plan leader <id> <teacher_id|->"),
                },
                Some(other) => println!("Unknown plan command '{other}'"),
            },
            "place" => {
                let placement = match (parts.next(), parts.next()) {
                    (Some("subject"), Some(id)) => Some(Placement::Subject(id.to_string())),
                    (Some("special"), Some(id)) => Some(Placement::Special(id.to_string())),
                    _ => None,
                };
                match placement {
                    Some(placement) => match self.planner.edit(|s| s.toggle_placement(placement)) {
                        Ok(true) => println!("Placement mode on."),
                        Ok(false) => println!("Placement mode off."),
                        Err(err) => println!("Error: {err}"),
                    },
                    None => println!("Usage: place <subject|special> <id>"),
                }
            }
            "put" => {
                let day = parts.next().and_then(parse_day);
                let slot = parts.next().and_then(|s| s.parse::<u8>().ok());
                match day.zip(slot).and_then(|(d, s)| CellKey::new(d, s)) {
                    Some(key) => match self.planner.apply_placement(key, true) {
                        Ok(true) => println!("Placed into {key}."),
                        Ok(false) => println!("Nothing armed; use 'place' first."),
                        Err(err) => println!("Rejected: {err}"),
                    },
                    None => println!("Usage: put <day> <slot>"),
                }
            }
            "label" => match parts.next().and_then(|s| s.parse::<usize>().ok()) {
                Some(slot) => {
                    let text = rest(parts);
                    match self.planner.edit(|s| s.set_slot_label(slot, &text)) {
                        Ok(()) => println!("Label updated."),
                        Err(err) => println!("Error: {err}"),
                    }
                }
                None => println!("Usage: label <slot> <text...>"),
            },
            "holidays" => self.holidays().await,
            "export" => match (parts.next(), parts.next()) {
                (Some("json"), Some(path)) => {
                    match persistence::export_document_json(self.planner.document(), path) {
                        Ok(()) => println!("Exported document to {path}."),
                        Err(err) => println!("Error exporting: {err}"),
                    }
                }
                (Some("csv"), Some(path)) => {
                    let doc = self.planner.document();
                    let iso = self.planner.view().iso;
                    match persistence::export_week_csv(doc, &doc.settings.active_plan_id, iso, path) {
                        Ok(()) => println!("Exported {iso} to {path}."),
                        Err(err) => println!("Error exporting: {err}"),
                    }
                }
                _ => println!("Usage: export <json|csv> <path>"),
            },
            "import" => {
                let mode = parts.next().map(|m| m.parse::<ImportMode>());
                match (mode, parts.next()) {
                    (Some(Ok(mode)), Some(path)) => match std::fs::read_to_string(path) {
                        Ok(text) => match self.planner.import_json(&text, mode) {
                            Ok(()) => {
                                println!("Imported {path} ({mode}).");
                                self.refresh_legal().await;
                                self.show();
                            }
                            Err(err) => println!("Error importing: {err}"),
                        },
                        Err(err) => println!("Error reading {path}: {err}"),
                    },
                    _ => println!("Usage: import <replace|merge> <path>"),
                }
            }
            "save" => match self.save() {
                Ok(()) => println!("Saved."),
                Err(err) => println!("Error saving: {err}"),
            },
            other => println!("Unknown command '{other}'. Type 'help'."),
        }
        Flow::Continue
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = PlannerConfig::load()?;
    let store = persistence::open_store(&config)?;
    let doc = persistence::load_document(store.as_ref());
    let holidays = HolidayService::for_config(
        &config,
        persistence::load_school_cache(store.as_ref()),
        persistence::load_legal_cache(store.as_ref()),
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let session = Session {
        planner: Planner::new(doc, chrono::Local::now().date_naive()),
        holidays,
        store,
        debouncer: SaveDebouncer::from_millis(config.save_debounce_ms),
    };
    let result = runtime.block_on(run(session));
    // A stdin read may still be parked on the blocking pool.
    runtime.shutdown_background();
    result
}

async fn run(mut session: Session) -> Result<(), Box<dyn std::error::Error>> {
    println!("Week Planner (CLI) - type 'help' for commands\n");
    session.refresh_legal().await;
    session.show();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut prompt = true;
    loop {
        if prompt {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let next = match session.debouncer.deadline() {
            Some(deadline) => tokio::select! {
                line = lines.next_line() => Some(line),
                _ = tokio::time::sleep_until(deadline.into()) => None,
            },
            None => Some(lines.next_line().await),
        };
        let Some(line) = next else {
            session.autosave();
            prompt = false;
            continue;
        };
        prompt = true;
        let Ok(Some(line)) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Flow::Quit = session.execute(input).await {
            break;
        }
        session.after_command();
    }

    if session.planner.is_dirty() || session.debouncer.is_pending() {
        session.save()?;
    }
    Ok(())
}
