use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use collegeform::client::ApiClient;
use collegeform::dashboard::{FacultySession, StudentSession, FY_NOTICE};
use collegeform::display;
use collegeform::models::{LoginRequest, Role};
use collegeform::unlock::POLL_INTERVAL;
use dotenv::dotenv;
use failure::Error;
use log::warn;
use std::time::Instant;
use structopt::StructOpt;
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(StructOpt)]
enum Command {
    /// Fill in the questionnaire
    Student,
    /// Manage questions and review students
    Faculty,
}

/// CollegeForm terminal dashboard
#[derive(StructOpt)]
struct Args {
    /// Server base URL
    #[structopt(short, long, env = "COLLEGEFORM_URL", default_value = "http://127.0.0.1:5000")]
    url: String,
    #[structopt(short = "n", long, env = "COLLEGEFORM_USER")]
    username: String,
    #[structopt(short, long, env = "COLLEGEFORM_PASSWORD")]
    password: String,
    #[structopt(subcommand)]
    command: Command,
}

type Input = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut Input, text: &str) -> Result<Option<String>, Error> {
    println!("{}", text);
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<(), exitfailure::ExitFailure> {
    let _ = dotenv();
    env_logger::init();
    let args = Args::from_args();
    let role = match args.command {
        Command::Student => Role::Student,
        Command::Faculty => Role::Faculty,
    };
    let mut api = ApiClient::new(args.url.clone());
    let login = api
        .login(&LoginRequest {
            username: Some(args.username.clone()),
            password: Some(args.password.clone()),
            role: Some(role.as_str().to_string()),
            ..Default::default()
        })
        .await?;
    println!("{}", login.message);
    let mut lines = BufReader::new(stdin()).lines();
    let result = match role {
        Role::Student => student(&api, login.user.id, &mut lines).await,
        Role::Faculty => faculty(&api, &mut lines).await,
    };
    if let Err(e) = api.logout().await {
        warn!("Logout failed: {}", e);
    }
    result?;
    Ok(())
}

fn print_form(session: &StudentSession) {
    for entry in session.layout() {
        if let Some(line) = display::form_entry(&entry, session.answer(entry.question.id)) {
            println!("{}", line);
        }
    }
}

async fn student(api: &ApiClient, student_id: i32, lines: &mut Input) -> Result<(), Error> {
    let (questions, loaded) =
        futures::try_join!(api.questions(Role::Student), api.my_responses())?;
    let mut session = StudentSession::new(student_id, questions);
    if session.merge_loaded(loaded).restricted {
        println!("{}", FY_NOTICE);
    }
    loop {
        print_form(&session);
        let input = match prompt(lines, "Enter question ID, 's' to save, 'q' to quit:").await? {
            Some(input) => input,
            None => return Ok(()),
        };
        match input.as_str() {
            "q" => return Ok(()),
            "s" => match api.save_responses(&session.save_payload()).await {
                Ok(res) if res.failed_count == 0 => println!("{}", res.message),
                Ok(res) => println!(
                    "Saved {} answer(s), {} could not be saved",
                    res.saved_count, res.failed_count
                ),
                Err(e) => println!("Failed to save responses: {}", e),
            },
            id => {
                let id = match id.parse::<i32>() {
                    Ok(id) => id,
                    Err(_) => {
                        println!("Invalid question ID");
                        continue;
                    }
                };
                let value = match prompt(lines, "Answer:").await? {
                    Some(value) => value,
                    None => return Ok(()),
                };
                match session.set_answer(id, &value) {
                    Ok(change) => {
                        if change.restricted && !change.cleared.is_empty() {
                            println!("{}", FY_NOTICE);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }
}

fn parse_local_time(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").ok()?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

async fn refresh(api: &ApiClient, session: &mut FacultySession) -> Result<(), Error> {
    session.replace_questions(api.questions(Role::Faculty).await?);
    for question in session.questions() {
        println!("{}", display::question_row(question));
    }
    Ok(())
}

async fn poll(api: &ApiClient, session: &mut FacultySession) {
    if !session.poll_due(Instant::now()) {
        return;
    }
    match api.check_auto_unlock().await {
        Ok(result) => {
            if let Some(notice) = FacultySession::check_notice(&result) {
                println!("{}", notice);
                if let Err(e) = refresh(api, session).await {
                    println!("Failed to load questions: {}", e);
                }
            }
        }
        Err(e) => warn!("Auto-unlock check failed: {}", e),
    }
}

async fn faculty_command(
    api: &ApiClient,
    session: &mut FacultySession,
    line: &str,
) -> Result<(), Error> {
    let mut parts = line.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();
    let id = || rest.split(' ').next().unwrap_or("").parse::<i32>();
    match cmd {
        "list" => refresh(api, session).await?,
        "lock" => {
            let res = api.toggle_lock(id()?).await?;
            println!(
                "{} (now {})",
                res.message,
                if res.is_locked { "locked" } else { "unlocked" }
            );
        }
        "schedule" => {
            let mut args = rest.splitn(2, ' ');
            let question = args.next().unwrap_or("").parse::<i32>()?;
            let at = args
                .next()
                .and_then(|s| parse_local_time(s.trim()))
                .ok_or_else(|| failure::format_err!("expected time as YYYY-MM-DD HH:MM"))?;
            println!("{}", api.schedule_unlock(question, at).await?.message);
        }
        "unschedule" => println!("{}", api.clear_schedule(id()?).await?.message),
        "due" => {
            for question in session.scheduled() {
                println!("{}", display::question_row(question));
            }
        }
        "search" => {
            for student in api.search(rest).await? {
                println!("{}", display::student_row(&student));
            }
        }
        "class" => {
            for student in api.students_by_class(rest).await? {
                println!("{}", display::student_row(&student));
            }
        }
        "view" => {
            let answers = api.student_responses(id()?).await?;
            for question in session.questions() {
                if let Some(answer) = answers.get(&question.id) {
                    println!("{}: {}", question.question_text, answer);
                }
            }
        }
        _ => println!(
            "Commands: list, lock <id>, schedule <id> <YYYY-MM-DD HH:MM>, unschedule <id>, \
             due, search <text>, class <FY|SY|TY>, view <student id>, quit"
        ),
    }
    Ok(())
}

async fn faculty(api: &ApiClient, lines: &mut Input) -> Result<(), Error> {
    let mut session = FacultySession::new(Vec::new());
    refresh(api, &mut session).await?;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => poll(api, &mut session).await,
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => return Ok(()),
                };
                let line = line.trim();
                if line == "quit" {
                    return Ok(());
                }
                if let Err(e) = faculty_command(api, &mut session, line).await {
                    println!("Error: {}", e);
                }
            }
        }
    }
}
