use chrono::Utc;
use collegeform::actions::{self, NewUserForm, QuestionScope};
use collegeform::display;
use collegeform::models::Role;
use collegeform::seed;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use dotenv::dotenv;
use exitfailure::ExitFailure;
use failure::ResultExt;
use structopt::StructOpt;

#[derive(StructOpt)]
enum Command {
    /// Insert demo users and the questionnaire if missing
    Seed,
    /// Create an account
    AddUser {
        username: String,
        /// student or faculty
        role: Role,
        #[structopt(short, long)]
        password: Option<String>,
        /// Federated identity id (Google)
        #[structopt(long)]
        google_id: Option<String>,
        #[structopt(long)]
        name: Option<String>,
        #[structopt(long)]
        email: Option<String>,
        #[structopt(long)]
        student_number: Option<String>,
        #[structopt(long)]
        department: Option<String>,
        #[structopt(long)]
        teacher_id: Option<String>,
    },
    /// List the questionnaire
    Questions,
    /// Run one auto-unlock sweep now
    Sweep,
}

/// CollegeForm administration
#[derive(StructOpt)]
struct Args {
    /// URL for PostgreSQL database
    #[structopt(short, long, env = "DATABASE_URL")]
    database_url: String,
    #[structopt(subcommand)]
    command: Command,
}

fn main() -> Result<(), ExitFailure> {
    let _ = dotenv();
    env_logger::init();
    let args = Args::from_args();
    let mut db = PgConnection::establish(&args.database_url).context("unable to connect database")?;
    match args.command {
        Command::Seed => {
            let report = seed::seed(&mut db).context("unable to seed database")?;
            println!(
                "Created {} users and {} questions",
                report.users_created, report.questions_created
            );
        }
        Command::AddUser {
            username,
            role,
            password,
            google_id,
            name,
            email,
            student_number,
            department,
            teacher_id,
        } => {
            let form = NewUserForm {
                username,
                role: Some(role),
                password,
                provider: google_id.as_ref().map(|_| String::from("google")),
                provider_id: google_id,
                email,
                name,
                student_number,
                department,
                teacher_id,
            };
            let id = actions::create_user(&mut db, &form).context("unable to create user")?;
            println!("Created {} {} with id {}", role, form.username, id);
        }
        Command::Questions => {
            let questions =
                actions::list_questions(&mut db, QuestionScope::All).context("unable to get questions")?;
            for question in &questions {
                println!("{}", display::question_row(question));
            }
        }
        Command::Sweep => {
            let report =
                actions::sweep_auto_unlock(&mut db, Utc::now()).context("unable to run sweep")?;
            println!(
                "Unlocked {} question(s), {} failed",
                report.unlocked_count, report.failed_count
            );
        }
    }
    Ok(())
}
