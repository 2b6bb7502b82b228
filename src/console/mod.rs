//! Line commands for driving the filters from a terminal
//!
//! ```text
//! category <label>      toggle a category
//! brand <label>         toggle a brand
//! price <min> <max>     drag the price slider to a range
//! discount <n>|off      set or unset the discount threshold
//! clear                 clear every filter
//! goto <query>          navigate to a query string, e.g. goto ?brand=A
//! back | forward        walk the session history
//! show                  print the current filter state
//! quit
//! ```

use anyhow::{Result, anyhow, bail};

use crate::catalog_filter::FilterAction;
use crate::models::PriceRange;
use crate::url_sync::QueryParams;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Filter(FilterAction),
    Navigate(QueryParams),
    Back,
    Forward,
    Show,
    Quit,
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match verb.to_ascii_lowercase().as_str() {
        "category" => ConsoleCommand::Filter(FilterAction::ToggleCategory(label(rest)?)),
        "brand" => ConsoleCommand::Filter(FilterAction::ToggleBrand(label(rest)?)),
        "price" => ConsoleCommand::Filter(FilterAction::SetPriceRange(price_range(rest)?)),
        "discount" => ConsoleCommand::Filter(FilterAction::SetDiscount(discount(rest)?)),
        "clear" => ConsoleCommand::Filter(FilterAction::ClearFilters),
        "goto" => ConsoleCommand::Navigate(QueryParams::parse(rest)),
        "back" => ConsoleCommand::Back,
        "forward" => ConsoleCommand::Forward,
        "show" => ConsoleCommand::Show,
        "quit" | "exit" => ConsoleCommand::Quit,
        "" => bail!("Empty command"),
        other => bail!("Unknown command '{other}'"),
    };

    Ok(command)
}

fn label(rest: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("Expected a label");
    }
    Ok(rest.to_string())
}

fn price_range(rest: &str) -> Result<PriceRange> {
    let mut parts = rest.split_whitespace().map(str::parse::<f64>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(min)), Some(Ok(max)), None) if min.is_finite() && max.is_finite() => {
            Ok(PriceRange::new(min, max))
        }
        _ => Err(anyhow!("Expected 'price <min> <max>', got 'price {rest}'")),
    }
}

fn discount(rest: &str) -> Result<Option<u32>> {
    match rest {
        "off" | "none" => Ok(None),
        n => n
            .parse::<u32>()
            .map(Some)
            .map_err(|_| anyhow!("Expected a whole percent or 'off', got '{n}'")),
    }
}
