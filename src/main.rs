//! emdx CLI entry point.
//!
//! Thin rendering layer over the [`facade::Store`] operations. The facade
//! returns typed values; this binary chooses between plain, rich, and JSON
//! output and maps error kinds to exit codes (0 ok, 1 generic, 2 not-found,
//! 3 invalid input, 130 cancelled).

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use emdx::config;
use emdx::error::{Error, Result};
use emdx::facade::{
    DelegateArgs, Digest, FindArgs, SaveArgs, SaveSource, Store,
};
use emdx::models::{DocType, ExecutionStatus, Task, TaskStatus};
use emdx::search::{SearchFilters, SearchMode, SearchResultItem};
use emdx::tasks::AddTaskOpts;

#[derive(Parser)]
#[command(
    name = "emdx",
    about = "emdx — a local-first knowledge base for developers and AI agents",
    version
)]
struct Cli {
    /// Emit structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit machine-readable plain text
    #[arg(long, global = true)]
    plain: bool,

    /// Emit terminal formatting (default)
    #[arg(long, global = true)]
    rich: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq)]
enum Output {
    Plain,
    Rich,
    Json,
}

impl Cli {
    fn output(&self) -> Output {
        if self.json {
            Output::Json
        } else if self.rich {
            Output::Rich
        } else if self.plain {
            Output::Plain
        } else {
            Output::Rich
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Save a document (content from --file, or stdin when --title is given)
    Save {
        /// Read content from this file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Project label
        #[arg(long)]
        project: Option<String>,

        /// Document type: user, wiki, or qa
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Skip the enrichment pipeline for this save
        #[arg(long)]
        no_auto_link: bool,
    },

    /// Search the knowledge base
    Find {
        /// Search query
        query: Option<String>,

        /// Search mode: keyword, semantic, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Require all of these tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Require any of these tags
        #[arg(long = "any-tag", value_delimiter = ',')]
        any_tags: Vec<String>,

        /// Exclude these tags
        #[arg(long = "not-tag", value_delimiter = ',')]
        not_tags: Vec<String>,

        /// Only docs created after this date (YYYY-MM-DD)
        #[arg(long)]
        created_after: Option<String>,

        /// Only docs created before this date (YYYY-MM-DD)
        #[arg(long)]
        created_before: Option<String>,

        /// Only docs modified after this date (YYYY-MM-DD)
        #[arg(long)]
        modified_after: Option<String>,

        /// Only docs modified before this date (YYYY-MM-DD)
        #[arg(long)]
        modified_before: Option<String>,

        /// Filter by document type
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Filter by project
        #[arg(long)]
        project: Option<String>,

        /// Include qa documents in results
        #[arg(long)]
        include_qa: bool,

        /// Maximum results
        #[arg(long)]
        limit: Option<i64>,

        /// Result offset for pagination
        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Pass FTS operator syntax through unquoted
        #[arg(long)]
        fts_syntax: bool,

        /// Skip ranking, return the newest N docs
        #[arg(long)]
        recent: Option<i64>,

        /// Rank by similarity to an existing doc id
        #[arg(long)]
        similar: Option<i64>,

        /// Answer a question from the store via the LLM
        #[arg(long)]
        ask: bool,

        /// Sample results from the top of the ranking
        #[arg(long)]
        wander: bool,
    },

    /// Show a document (bumps its access count)
    View { id: i64 },

    /// Replace a document's content (from --file or stdin)
    Edit {
        id: i64,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Move a document to the trash
    Delete {
        id: i64,
        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Restore a document from the trash
    Restore { id: i64 },

    /// Store summary: counts of docs, tasks, executions, events
    Status,

    /// Compact context digest for agents
    Prime,

    /// Morning digest: recent docs, ready tasks, recent events
    Briefing,

    /// Spawn agent subprocesses and capture their output
    Delegate {
        /// One prompt per agent
        prompts: Vec<String>,

        /// Agent flavour recorded on the executions
        #[arg(long, default_value = "general-purpose")]
        agent: String,

        /// Isolate each agent in a fresh git worktree
        #[arg(long)]
        worktree: bool,

        /// Repository for --worktree (defaults to the cwd)
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Base branch for --worktree
        #[arg(long)]
        base_branch: Option<String>,

        /// Commit, push, and open a PR after a clean exit
        #[arg(long)]
        pr: bool,

        /// Combine all outputs into one synthesis document
        #[arg(long)]
        synthesize: bool,

        /// Link the executions to a task (#id or CAT-N)
        #[arg(long)]
        task: Option<String>,
    },

    /// Hybrid search with rich output (shortcut for find)
    Explore { query: String },

    /// Launch the terminal UI
    Gui,

    /// Print the emdx version
    Version,

    /// Task management
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Tag management
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Store maintenance
    Maintain {
        #[command(subcommand)]
        action: MaintainAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a task
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Category key for a KEY-N identifier
        #[arg(long)]
        cat: Option<String>,
        /// Epic this task belongs to (#id or CAT-N)
        #[arg(long)]
        epic: Option<String>,
        /// Create the task as an epic
        #[arg(long)]
        is_epic: bool,
    },
    /// Tasks that are unblocked and workable right now
    Ready,
    /// Mark a task active
    Active { id: String },
    /// Mark a task done
    Done { id: String },
    /// Mark a task blocked
    Blocked { id: String },
    /// Mark a task wontdo
    Wontdo { id: String },
    /// Reopen a task
    U { id: String },
    /// Show a task with its blockers and dependants
    View { id: String },
    /// List tasks, optionally by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// List categories and their sequence counters
    Cat,
    /// Show epic progress
    Epic { id: String },
    /// Add or remove a dependency (blocked depends on blocker)
    Dep {
        blocked: String,
        blocker: String,
        #[arg(long)]
        remove: bool,
    },
    /// Show a task's full upstream blocker chain
    Chain { id: String },
}

#[derive(Subcommand)]
enum TagAction {
    /// Add tags to a document
    Add {
        doc_id: i64,
        #[arg(value_delimiter = ',')]
        names: Vec<String>,
    },
    /// Remove tags from a document
    Remove {
        doc_id: i64,
        #[arg(value_delimiter = ',')]
        names: Vec<String>,
    },
    /// List a document's tags
    List { doc_id: i64 },
    /// All tags with usage counts
    Legend,
}

#[derive(Subcommand)]
enum MaintainAction {
    /// Purge old trash and rebuild the FTS index
    Compact {
        /// Purge trash deleted more than this many days ago
        #[arg(long, default_value_t = 30)]
        older_than_days: i64,
    },
    /// Rebuild chunks and embeddings for every document
    Index,
    /// Backfill enrichment links for every document
    Link,
    /// Integrity check + VACUUM
    Vacuum,
    /// Regenerate wiki articles from tag clusters
    Wiki,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("EMDX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = cli.output();

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    match run(cli, output, cancel).await {
        Ok(()) => {}
        Err(e) => {
            if output == Output::Json {
                println!(
                    "{}",
                    serde_json::json!({ "error": { "kind": e.kind(), "message": e.to_string() } })
                );
            } else {
                eprintln!("error ({}): {e}", e.kind());
            }
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, output: Output, cancel: CancellationToken) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("emdx {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if let Commands::Gui = cli.command {
        return Err(Error::input(
            "the terminal UI ships as a separate frontend; this build provides the CLI",
        ));
    }

    let config = config::load_default()?;
    let store = Store::open(config).await?;

    let result = dispatch(&store, cli.command, output, &cancel).await;

    if cancel.is_cancelled() {
        store.abort_background().await;
    }
    store.shutdown().await;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    result
}

async fn dispatch(
    store: &Store,
    command: Commands,
    output: Output,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Commands::Version | Commands::Gui => unreachable!("handled before store open"),

        Commands::Save {
            file,
            title,
            tags,
            project,
            doc_type,
            no_auto_link,
        } => {
            let source = match file {
                Some(path) => SaveSource::File(path),
                None => {
                    if title.is_none() {
                        return Err(Error::input(
                            "reading from stdin requires --title (or pass --file)",
                        ));
                    }
                    SaveSource::Text(read_stdin()?)
                }
            };
            let doc_type = doc_type.as_deref().map(DocType::parse).transpose()?;
            let saved = store
                .save(SaveArgs {
                    source,
                    title,
                    tags,
                    project,
                    doc_type,
                    auto_link: !no_auto_link,
                })
                .await?;

            match output {
                Output::Json => print_json(&saved)?,
                Output::Plain => println!("saved {} {}", saved.document.id, saved.document.title),
                Output::Rich => println!(
                    "{} #{} {}",
                    "saved".green().bold(),
                    saved.document.id,
                    saved.document.title.bold()
                ),
            }
            Ok(())
        }

        Commands::Find {
            query,
            mode,
            tags,
            any_tags,
            not_tags,
            created_after,
            created_before,
            modified_after,
            modified_before,
            doc_type,
            project,
            include_qa,
            limit,
            offset,
            fts_syntax,
            recent,
            similar,
            ask,
            wander,
        } => {
            if ask {
                let question = query
                    .ok_or_else(|| Error::input("--ask requires a question"))?;
                let qa = store.ask(&question, cancel).await?;
                match output {
                    Output::Json => print_json(&qa)?,
                    Output::Plain => {
                        println!("{}", qa.answer);
                        println!("sources: {:?}", qa.source_doc_ids);
                    }
                    Output::Rich => {
                        println!("{}", qa.answer);
                        println!(
                            "\n{} {}",
                            "sources:".dimmed(),
                            qa.source_doc_ids
                                .iter()
                                .map(|id| format!("#{id}"))
                                .collect::<Vec<_>>()
                                .join(" ")
                        );
                    }
                }
                return Ok(());
            }

            let filters = SearchFilters {
                tags_all: tags,
                tags_any: any_tags,
                tags_none: not_tags,
                created_after: parse_date(created_after.as_deref(), false)?,
                created_before: parse_date(created_before.as_deref(), true)?,
                modified_after: parse_date(modified_after.as_deref(), false)?,
                modified_before: parse_date(modified_before.as_deref(), true)?,
                doc_type: doc_type.as_deref().map(DocType::parse).transpose()?,
                project,
                include_qa,
            };

            let items = store
                .find(FindArgs {
                    query,
                    mode: SearchMode::parse(&mode)?,
                    filters,
                    limit,
                    offset,
                    fts_syntax,
                    recent,
                    similar_to: similar,
                    wander,
                })
                .await?;

            render_results(&items, output)
        }

        Commands::Explore { query } => {
            let items = store
                .find(FindArgs {
                    query: Some(query),
                    mode: SearchMode::Hybrid,
                    ..Default::default()
                })
                .await?;
            render_results(&items, Output::Rich)
        }

        Commands::View { id } => {
            let view = store.view(id).await?;
            match output {
                Output::Json => print_json(&view)?,
                Output::Plain => {
                    println!("# {}", view.document.title);
                    println!("{}", view.document.content);
                }
                Output::Rich => {
                    println!("{}", view.document.title.bold().underline());
                    if !view.tags.is_empty() {
                        println!("{} {}", "tags:".dimmed(), view.tags.join(", "));
                    }
                    println!();
                    println!("{}", view.document.content);
                    if !view.links.is_empty() {
                        println!("\n{}", "links:".dimmed());
                        for link in &view.links {
                            println!(
                                "  {} -> {} ({})",
                                link.source_doc_id,
                                link.target_doc_id,
                                link.kind.as_str()
                            );
                        }
                    }
                }
            }
            Ok(())
        }

        Commands::Edit { id, file } => {
            let content = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .map_err(|e| Error::input(format!("failed to read {}: {e}", path.display())))?,
                None => read_stdin()?,
            };
            let doc = store.edit(id, &content).await?;
            match output {
                Output::Json => print_json(&doc)?,
                _ => println!("updated #{} to version {}", doc.id, doc.current_version),
            }
            Ok(())
        }

        Commands::Delete { id, force } => {
            if !force && atty::is(atty::Stream::Stdin) && !confirm(&format!("delete document #{id}?"))? {
                return Ok(());
            }
            store.delete(id).await?;
            println!("deleted #{id} (restore with `emdx restore {id}`)");
            Ok(())
        }

        Commands::Restore { id } => {
            let doc = store.restore(id).await?;
            println!("restored #{} {}", doc.id, doc.title);
            Ok(())
        }

        Commands::Status => {
            let report = store.status().await?;
            match output {
                Output::Json => print_json(&report)?,
                _ => {
                    println!("database:    {}", report.db_path);
                    println!("documents:   {} live, {} trashed", report.documents_live, report.documents_trashed);
                    println!("tags:        {}", report.tags);
                    println!("tasks:       {} open, {} done", report.tasks_open, report.tasks_done);
                    println!("executions:  {} running", report.executions_running);
                    println!("events:      {}", report.events);
                }
            }
            Ok(())
        }

        Commands::Prime => {
            let digest = store.prime().await?;
            render_digest(&digest, output)
        }

        Commands::Briefing => {
            let digest = store.briefing().await?;
            render_digest(&digest, output)
        }

        Commands::Delegate {
            prompts,
            agent,
            worktree,
            repo,
            base_branch,
            pr,
            synthesize,
            task,
        } => {
            let batch = store
                .delegate(
                    DelegateArgs {
                        prompts,
                        agent_type: agent,
                        worktree,
                        repo_dir: repo,
                        base_branch,
                        pr,
                        synthesize,
                        task,
                    },
                    cancel,
                    |outcome| {
                        // Results stream in completion order, not launch order.
                        let exec = &outcome.execution;
                        match exec.status {
                            ExecutionStatus::Completed => {
                                println!("[{}] completed: {}", exec.id, exec.doc_title);
                                if let Some(doc_id) = exec.doc_id {
                                    println!("    saved as document #{doc_id}");
                                }
                            }
                            status => println!(
                                "[{}] {} (exit {:?})",
                                exec.id,
                                status.as_str(),
                                exec.exit_code
                            ),
                        }
                    },
                )
                .await?;

            if let Some(doc_id) = batch.synthesis_doc_id {
                println!("synthesis saved as document #{doc_id}");
            }
            if output == Output::Json {
                let ids: Vec<i64> = batch.outcomes.iter().map(|o| o.execution.id).collect();
                print_json(&serde_json::json!({
                    "executions": ids,
                    "synthesis_doc_id": batch.synthesis_doc_id
                }))?;
            }
            Ok(())
        }

        Commands::Task { action } => run_task(store, action, output).await,
        Commands::Tag { action } => run_tag(store, action, output).await,
        Commands::Maintain { action } => run_maintain(store, action, output, cancel).await,
    }
}

async fn run_task(store: &Store, action: TaskAction, output: Output) -> Result<()> {
    match action {
        TaskAction::Add {
            title,
            description,
            priority,
            cat,
            epic,
            is_epic,
        } => {
            let task = store
                .task_add(
                    &title,
                    AddTaskOpts {
                        description,
                        priority,
                        category: cat,
                        epic,
                        is_epic,
                        ..Default::default()
                    },
                )
                .await?;
            match output {
                Output::Json => print_json(&task)?,
                _ => println!("added {} {}", task.display_id(), task.title),
            }
            Ok(())
        }
        TaskAction::Ready => {
            let tasks = store.task_ready().await?;
            render_tasks(&tasks, output)
        }
        TaskAction::Active { id } => task_transition(store, &id, TaskStatus::Active, output).await,
        TaskAction::Done { id } => task_transition(store, &id, TaskStatus::Done, output).await,
        TaskAction::Blocked { id } => {
            task_transition(store, &id, TaskStatus::Blocked, output).await
        }
        TaskAction::Wontdo { id } => task_transition(store, &id, TaskStatus::Wontdo, output).await,
        TaskAction::U { id } => task_transition(store, &id, TaskStatus::Open, output).await,
        TaskAction::View { id } => {
            let view = store.task_view(&id).await?;
            match output {
                Output::Json => print_json(&view)?,
                _ => {
                    println!(
                        "{} [{}] {}",
                        view.task.display_id(),
                        view.task.status.as_str(),
                        view.task.title
                    );
                    if let Some(desc) = &view.task.description {
                        println!("  {desc}");
                    }
                    for blocker in &view.blockers {
                        println!("  blocked by {} [{}]", blocker.display_id(), blocker.status.as_str());
                    }
                    for dep in &view.dependants {
                        println!("  blocks {} [{}]", dep.display_id(), dep.status.as_str());
                    }
                }
            }
            Ok(())
        }
        TaskAction::List { status } => {
            let status = status.as_deref().map(TaskStatus::parse).transpose()?;
            let tasks = store.task_list(status).await?;
            render_tasks(&tasks, output)
        }
        TaskAction::Cat => {
            let categories = store.task_categories().await?;
            for (key, name, next_seq) in categories {
                println!("{key}: {name} (next {key}-{next_seq})");
            }
            Ok(())
        }
        TaskAction::Epic { id } => {
            let progress = store.task_epic_progress(&id).await?;
            match output {
                Output::Json => print_json(&progress)?,
                _ => println!(
                    "{}/{} done ({:.0}%)",
                    progress.done, progress.total, progress.percent
                ),
            }
            Ok(())
        }
        TaskAction::Dep {
            blocked,
            blocker,
            remove,
        } => {
            if remove {
                store.task_dep_remove(&blocked, &blocker).await?;
                println!("removed: {blocked} no longer depends on {blocker}");
            } else {
                store.task_dep_add(&blocked, &blocker).await?;
                println!("{blocked} now depends on {blocker}");
            }
            Ok(())
        }
        TaskAction::Chain { id } => {
            let chain = store.task_chain(&id).await?;
            if chain.is_empty() {
                println!("no upstream blockers");
            }
            render_tasks(&chain, output)
        }
    }
}

async fn task_transition(
    store: &Store,
    id: &str,
    status: TaskStatus,
    output: Output,
) -> Result<()> {
    let change = store.task_status(id, status).await?;
    match output {
        Output::Json => print_json(&change)?,
        _ => {
            println!(
                "{} -> {}",
                change.task.display_id(),
                change.task.status.as_str()
            );
            for warning in &change.warnings {
                eprintln!("warning: {warning}");
            }
            for unblocked in &change.unblocked {
                println!("unblocked task #{unblocked}");
            }
        }
    }
    Ok(())
}

async fn run_tag(store: &Store, action: TagAction, output: Output) -> Result<()> {
    match action {
        TagAction::Add { doc_id, names } => {
            let tags = store.tag_add(doc_id, &names).await?;
            println!("#{doc_id}: {}", tags.join(", "));
            Ok(())
        }
        TagAction::Remove { doc_id, names } => {
            let tags = store.tag_remove(doc_id, &names).await?;
            println!("#{doc_id}: {}", tags.join(", "));
            Ok(())
        }
        TagAction::List { doc_id } => {
            let tags = store.tag_list(doc_id).await?;
            match output {
                Output::Json => print_json(&tags)?,
                _ => println!("{}", tags.join(", ")),
            }
            Ok(())
        }
        TagAction::Legend => {
            let legend = store.tag_legend().await?;
            match output {
                Output::Json => print_json(&legend)?,
                _ => {
                    for (name, uses) in legend {
                        println!("{name}: {uses}");
                    }
                }
            }
            Ok(())
        }
    }
}

async fn run_maintain(
    store: &Store,
    action: MaintainAction,
    output: Output,
    cancel: &CancellationToken,
) -> Result<()> {
    match action {
        MaintainAction::Compact { older_than_days } => {
            let report = store.maintain_compact(older_than_days).await?;
            match output {
                Output::Json => print_json(&report)?,
                _ => println!("purged {} trashed document(s); FTS index rebuilt", report.purged),
            }
            Ok(())
        }
        MaintainAction::Index => {
            let count = store.maintain_index().await?;
            println!("reindexed {count} document(s)");
            Ok(())
        }
        MaintainAction::Link => {
            let count = store.maintain_link().await?;
            println!("enriched {count} document(s)");
            Ok(())
        }
        MaintainAction::Vacuum => {
            let integrity = store.maintain_vacuum().await?;
            println!("integrity: {integrity}");
            Ok(())
        }
        MaintainAction::Wiki => {
            let articles = store.maintain_wiki(cancel).await?;
            match output {
                Output::Json => print_json(&articles)?,
                _ => {
                    for article in &articles {
                        println!(
                            "#{} {} ({} sources)",
                            article.doc_id,
                            article.topic,
                            article.source_doc_ids.len()
                        );
                    }
                    println!("{} article(s) generated", articles.len());
                }
            }
            Ok(())
        }
    }
}

// ============ Rendering helpers ============

fn render_results(items: &[SearchResultItem], output: Output) -> Result<()> {
    match output {
        Output::Json => print_json(&items)?,
        Output::Plain => {
            for item in items {
                println!("{}\t{:.4}\t{}", item.id, item.score, item.title);
            }
        }
        Output::Rich => {
            if items.is_empty() {
                println!("no results");
                return Ok(());
            }
            for (i, item) in items.iter().enumerate() {
                println!(
                    "{}. {} {}",
                    i + 1,
                    format!("#{}", item.id).dimmed(),
                    item.title.bold()
                );
                let mut scores = format!("score {:.4}", item.score);
                if let Some(k) = item.keyword_score {
                    scores.push_str(&format!("  kw {k:.2}"));
                }
                if let Some(s) = item.semantic_score {
                    scores.push_str(&format!("  sem {s:.2}"));
                }
                println!("   {}", scores.dimmed());
                if !item.snippet.is_empty() {
                    println!("   {}", item.snippet.replace('\n', " "));
                }
            }
        }
    }
    Ok(())
}

fn render_tasks(tasks: &[Task], output: Output) -> Result<()> {
    match output {
        Output::Json => print_json(&tasks)?,
        _ => {
            for task in tasks {
                println!(
                    "{} [{}] p{} {}",
                    task.display_id(),
                    task.status.as_str(),
                    task.priority,
                    task.title
                );
            }
        }
    }
    Ok(())
}

fn render_digest(digest: &Digest, output: Output) -> Result<()> {
    match output {
        Output::Json => print_json(digest)?,
        _ => {
            println!("recent documents:");
            for doc in &digest.recent_docs {
                println!("  #{} {}", doc.id, doc.title);
            }
            println!("ready tasks:");
            for task in &digest.ready_tasks {
                println!("  {} p{} {}", task.display_id(), task.priority, task.title);
            }
            if !digest.running_executions.is_empty() {
                println!("running executions:");
                for exec in &digest.running_executions {
                    println!("  [{}] {}", exec.id, exec.doc_title);
                }
            }
            if !digest.recent_events.is_empty() {
                println!("recent events:");
                for event in &digest.recent_events {
                    println!(
                        "  {} {}{}",
                        event.created_at,
                        event.event_type,
                        event
                            .doc_id
                            .map(|id| format!(" #{id}"))
                            .unwrap_or_default()
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).map_err(|e| Error::Storage(e.to_string()))?
    );
    Ok(())
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| Error::input(format!("failed to read stdin: {e}")))?;
    Ok(buf)
}

/// Interactive yes/no prompt. Destructive commands skip this entirely when
/// stdin is not a TTY (agent use).
fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| Error::input(e.to_string()))?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn parse_date(s: Option<&str>, end_of_day: bool) -> Result<Option<i64>> {
    let Some(s) = s else { return Ok(None) };
    let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| Error::input(format!("invalid date '{s}'; expected YYYY-MM-DD")))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.map(|t| t.and_utc().timestamp()))
}
