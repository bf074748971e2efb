use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::config::AppConfig;
use crate::engine::{project, FilterState, RecordStore, SortMode};
use crate::store::StoreHandle;

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Provide the seed body inline. If omitted, reads from stdin.
    #[arg()]
    pub body: Option<String>,
    /// Attach a tag (repeatable); tags are created on first use
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// File the seed under an existing category path, e.g. /work
    #[arg(long)]
    pub category: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Substring query matched against bodies, tag names and category names
    #[arg()]
    pub query: Vec<String>,
    /// Only seeds carrying this tag (repeatable, matches any)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Only seeds filed under this category path (repeatable, matches any)
    #[arg(long = "category")]
    pub categories: Vec<String>,
    /// Sort order: newest, oldest or alphabetical
    #[arg(long, default_value = "newest")]
    pub sort: SortMode,
    /// Limit the number of seeds printed
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub fn new_seed(config: Arc<AppConfig>, store: StoreHandle, args: NewArgs) -> Result<()> {
    let body = if let Some(body) = args.body {
        body
    } else {
        match read_stdin()? {
            Some(body) => body,
            None => bail!("seed body required: pass it as an argument or pipe it on stdin"),
        }
    };

    let seed_id = store
        .create_seed(
            &config.owner_id,
            &body,
            &args.tags,
            args.category.as_deref(),
        )
        .context("creating seed")?;
    println!("Created seed {seed_id}");
    Ok(())
}

pub fn list_seeds(_config: Arc<AppConfig>, store: StoreHandle, args: ListArgs) -> Result<()> {
    let output = run_list(&store, &args)?;
    print!("{output}");
    Ok(())
}

fn run_list(store: &StoreHandle, args: &ListArgs) -> Result<String> {
    let records = RecordStore {
        seeds: store.fetch_all_seeds()?,
        tags: store.fetch_all_tags()?,
        categories: store.fetch_all_categories()?,
    };

    let mut filters = FilterState::default();
    filters.query = args.query.join(" ");
    filters.sort = args.sort;
    for name in &args.tags {
        let tag = records
            .tags
            .iter()
            .find(|tag| tag.name.eq_ignore_ascii_case(name));
        match tag {
            Some(tag) => {
                filters.selected_tags.insert(tag.id.clone());
            }
            None => bail!("tag '{name}' does not exist"),
        }
    }
    for path in &args.categories {
        let category = records
            .categories
            .iter()
            .find(|category| category.path.eq_ignore_ascii_case(path));
        match category {
            Some(category) => {
                filters.selected_categories.insert(category.id.clone());
            }
            None => bail!("category '{path}' does not exist"),
        }
    }

    let projection = project(&records, &filters);
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", projection.count_label());
    for seed in projection.seeds.iter().take(args.limit) {
        let headline = seed.display_body().lines().next().unwrap_or("(empty seed)");
        let _ = writeln!(&mut out, "{}  {}", seed.id, headline);
        let _ = writeln!(&mut out, "    created {}", seed.created_at);
        let tags = seed.tag_refs();
        if !tags.is_empty() {
            let names = tags
                .iter()
                .map(|tag| format!("#{}", tag.name))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(&mut out, "    tags    {names}");
        }
        let categories = seed.category_refs();
        if !categories.is_empty() {
            let paths = categories
                .iter()
                .map(|category| category.path.clone())
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(&mut out, "    filed   {paths}");
        }
    }
    Ok(out)
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
