//! 程序入口：初始化日志、加载配置，并把命令分派到编辑会话

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::fmt::SubscriberBuilder;

use biaoge_bianji::model::performance::run_performance_suite;
use biaoge_bianji::vm::bridge::ItemSelector;
use biaoge_bianji::{AppState, ContentDir, EditorConfig, Path};

#[derive(Parser)]
#[command(about = "把 JSON 文档与工作簿当作表格查看和编辑")]
struct Cli {
    /// 内容目录（覆盖配置文件与环境变量）
    #[arg(long, value_name = "DIR")]
    content_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 列出内容目录中的文件
    List,
    /// 把本地文件存入内容目录
    Upload { file: PathBuf },
    /// 列出文件中的表格（工作簿为可见工作表）
    Tables { identifier: String },
    /// 输出表格视图；指定 `--nested` 时输出嵌套子表
    View {
        #[command(flatten)]
        target: Target,
        #[arg(long, requires = "row")]
        nested: Option<String>,
        #[arg(long, requires = "nested")]
        row: Option<usize>,
    },
    /// 修改一个单元格
    Set {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        row: usize,
        #[arg(long)]
        header: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        nested: Option<String>,
        /// 嵌套记录数组中的条目下标；省略时直接修改嵌套对象
        #[arg(long, requires = "nested")]
        item: Option<usize>,
    },
    /// 追加一行
    AddRow {
        #[command(flatten)]
        target: Target,
        #[arg(long, requires = "row")]
        nested: Option<String>,
        #[arg(long, requires = "nested")]
        row: Option<usize>,
    },
    /// 删除一行
    DeleteRow {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        row: usize,
        #[arg(long, requires = "item")]
        nested: Option<String>,
        #[arg(long, requires = "nested")]
        item: Option<usize>,
    },
    /// 运行性能测试
    Bench,
}

#[derive(Args)]
struct Target {
    identifier: String,
    /// 表格路径（JSON）或工作表名（工作簿）；省略时取第一个表格
    #[arg(long)]
    table: Option<String>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_session(config: &EditorConfig, target: &Target) -> Result<AppState<ContentDir>> {
    let store = ContentDir::open(&config.content_dir, config.pretty_json)
        .with_context(|| format!("无法打开内容目录: {}", config.content_dir.display()))?;
    let mut state = AppState::new(store, config.conflict_policy);
    state
        .open(&target.identifier, target.table.as_deref())
        .with_context(|| format!("文件加载失败: {}", target.identifier))?;
    Ok(state)
}

fn nested_path(text: &str) -> Result<Path> {
    Path::parse(text).with_context(|| format!("嵌套路径无效: {}", text))
}

fn run(config: &EditorConfig, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let store = ContentDir::open(&config.content_dir, config.pretty_json)?;
            let state = AppState::new(store, config.conflict_policy);
            print_json(&state.list_files()?)
        }
        Command::Upload { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("读取失败: {}", file.display()))?;
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("文件名无效")?;
            let store = ContentDir::open(&config.content_dir, config.pretty_json)?;
            let state = AppState::new(store, config.conflict_policy);
            print_json(&state.upload(name, &bytes)?)
        }
        Command::Tables { identifier } => {
            let target = Target { identifier, table: None };
            let state = open_session(config, &target)?;
            let names: Vec<String> = state.tables()?.iter().map(|t| t.name()).collect();
            print_json(&names)
        }
        Command::View { target, nested, row } => {
            let state = open_session(config, &target)?;
            match (nested, row) {
                (Some(nested), Some(row)) => print_json(&state.nested(row, &nested_path(&nested)?)?),
                _ => print_json(&state.payload()?),
            }
        }
        Command::Set {
            target,
            row,
            header,
            value,
            nested,
            item,
        } => {
            let mut state = open_session(config, &target)?;
            match nested {
                Some(nested) => {
                    let selector = item.map_or(ItemSelector::WholeObject, ItemSelector::ElementAt);
                    state.set_nested_cell(row, &nested_path(&nested)?, selector, &header, value)?;
                }
                None => state.set_cell(row, &header, value)?,
            }
            if state.is_dirty() {
                state.save()?;
            }
            print_json(&state.payload()?)
        }
        Command::AddRow { target, nested, row } => {
            let mut state = open_session(config, &target)?;
            match (nested, row) {
                (Some(nested), Some(row)) => state.add_nested_row(row, &nested_path(&nested)?)?,
                _ => state.add_row()?,
            }
            state.save()?;
            print_json(&state.payload()?)
        }
        Command::DeleteRow {
            target,
            row,
            nested,
            item,
        } => {
            let mut state = open_session(config, &target)?;
            match (nested, item) {
                (Some(nested), Some(item)) => state.delete_nested_row(row, &nested_path(&nested)?, item)?,
                _ => state.delete_row(row)?,
            }
            if state.is_dirty() {
                state.save()?;
            }
            print_json(&state.payload()?)
        }
        Command::Bench => print_json(&run_performance_suite()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = EditorConfig::load().context("配置加载失败")?;
    if let Some(dir) = cli.content_dir {
        config.content_dir = dir;
    }

    // 日志输出到 stderr，stdout 只输出 JSON
    let _ = SubscriberBuilder::default()
        .with_max_level(config.max_level())
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!("内容目录: {}", config.content_dir.display());
    run(&config, cli.command)
}
