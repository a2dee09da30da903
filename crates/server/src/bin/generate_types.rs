use std::{env, fs, path::Path};

use ts_rs::TS;

fn generate_types_content() -> String {
    let header = "// This file was generated by `cargo run --bin generate_types`. Do not edit manually.\n";

    let decls: Vec<String> = vec![
        db::models::repository::Repository::decl(),
        db::models::git_command_log::GitCommandLog::decl(),
        db::models::git_command_log::GitCommandLogFilter::decl(),
        git::CommandType::decl(),
        git::CommandOutcome::decl(),
        git::GitHash::decl(),
        git::UpstreamTrack::decl(),
        git::LocalBranch::decl(),
        git::RemoteBranch::decl(),
        git::Branches::decl(),
        git::CommitUser::decl(),
        git::Commit::decl(),
        git::FileStatus::decl(),
        git::File::decl(),
        git::ChangedFiles::decl(),
        utils::diff::DiffStatus::decl(),
        utils::diff::WordDiff::decl(),
        utils::diff::LineDiff::decl(),
        utils::diff::Hunk::decl(),
        utils::diff::FileDiff::decl(),
        utils::response::ApiResponse::<(), ()>::decl(),
        services::services::config::Config::decl(),
        services::services::error::EngineErrorKind::decl(),
        services::services::error::EngineErrorPayload::decl(),
        services::services::events::EngineEvent::decl(),
        server::routes::repositories::AddRepositoryRequest::decl(),
        server::routes::git::GraphQuery::decl(),
        server::routes::git::FileDiffQuery::decl(),
        server::routes::git::WorkingFileDiffQuery::decl(),
        server::routes::git::CommandLogQuery::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{header}\n{body}\n")
}

fn main() {
    let check_mode = env::args().any(|arg| arg == "--check");
    let shared_path = Path::new("shared");
    let types_path = shared_path.join("types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&types_path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date.");
            std::process::exit(0);
        } else {
            eprintln!("❌ shared/types.ts is not up to date. Please run 'cargo run --bin generate_types' and commit the changes.");
            std::process::exit(1);
        }
    }

    println!("Generating TypeScript types…");
    if let Err(e) = fs::create_dir_all(shared_path).and_then(|()| fs::write(&types_path, generated)) {
        eprintln!("Failed to write {}: {}", types_path.display(), e);
        std::process::exit(1);
    }
    println!("✅ TypeScript types generated in shared/");
}
