use anyhow::{Context, Result, bail};
use clap::Subcommand;
use devdash_core::{Clock, KeyValueStore, SystemClock, Toolkit, ToolkitDraft, ToolkitItem, ToolkitKind};

use crate::state::open_store;

#[derive(Subcommand, Debug)]
pub enum ToolkitCommand {
    /// Save a link
    AddLink {
        title: String,
        url: String,
        /// Tag (repeatable)
        #[arg(long = "tag", short)]
        tags: Vec<String>,
    },

    /// Save a code snippet
    AddSnippet {
        title: String,
        body: String,
        #[arg(long = "tag", short)]
        tags: Vec<String>,
    },

    /// List saved items, optionally filtered
    List {
        /// Case-insensitive match on title, content or tag
        #[arg(long, short)]
        query: Option<String>,

        /// Only items carrying this tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Remove an item by id or unique id prefix
    Rm { id: String },
}

pub fn run(cmd: ToolkitCommand) -> Result<()> {
    match cmd {
        ToolkitCommand::AddLink { title, url, tags } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("link must start with http:// or https://");
            }
            add(ToolkitDraft::link(title, url).with_tags(tags))
        }
        ToolkitCommand::AddSnippet { title, body, tags } => {
            add(ToolkitDraft::snippet(title, body).with_tags(tags))
        }
        ToolkitCommand::List { query, tag } => list(query.as_deref(), tag.as_deref()),
        ToolkitCommand::Rm { id } => remove(&id),
    }
}

fn add(draft: ToolkitDraft) -> Result<()> {
    let mut store = open_store()?;
    let item = add_item(&mut store, &SystemClock, draft)?;
    println!("Saved {}", item_line(&item));
    Ok(())
}

/// Validate `draft`, stamp it with `clock` and persist the toolkit.
pub fn add_item(store: &mut impl KeyValueStore, clock: &impl Clock, draft: ToolkitDraft) -> Result<ToolkitItem> {
    if draft.title.trim().is_empty() {
        bail!("title must not be blank");
    }
    let mut kit = Toolkit::load(&*store);
    let item = kit.add(draft, clock.now()).clone();
    kit.save(store).context("save toolkit")?;
    tracing::info!(id = %item.id, kind = ?item.kind, "toolkit item added");
    Ok(item)
}

fn list(query: Option<&str>, tag: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let kit = Toolkit::load(&store);
    let mut items = kit.search(query.unwrap_or_default());
    if let Some(tag) = tag {
        let tagged: Vec<&str> = kit.by_tag(tag).iter().map(|i| i.id.as_str()).collect();
        items.retain(|i| tagged.contains(&i.id.as_str()));
    }

    if items.is_empty() {
        println!("Nothing saved yet.");
        return Ok(());
    }
    for item in items {
        println!("{}", item_line(item));
        if item.kind == ToolkitKind::Snippet {
            for l in item.content.lines() {
                println!("    {l}");
            }
        }
    }
    Ok(())
}

fn remove(prefix: &str) -> Result<()> {
    let mut store = open_store()?;
    let mut kit = Toolkit::load(&store);
    let Some(id) = kit.resolve(prefix).map(|i| i.id.clone()) else {
        bail!("no single toolkit item matches {prefix:?}");
    };
    if let Some(item) = kit.remove(&id) {
        kit.save(&mut store).context("save toolkit")?;
        println!("Removed \"{}\"", item.title);
    }
    Ok(())
}

pub fn item_line(item: &ToolkitItem) -> String {
    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        format!(" #{}", item.tags.join(" #"))
    };
    match item.kind {
        ToolkitKind::Link => format!("{} [link] {} <{}>{tags}", item.id, item.title, item.content),
        ToolkitKind::Snippet => format!("{} [snippet] {}{tags}", item.id, item.title),
    }
}
