//! Query assembler: combines compiled formulas into one `SELECT`.
//!
//! Joins and aggregates are deduplicated across formulas by semantic id.
//! Every direct relationship link becomes a `LEFT JOIN`, and aggregates over
//! the same relationship path share one grouped subquery that is joined back
//! to the base table on its primary key.

mod render;

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use indexmap::IndexMap;

use crate::intent::{AggregateIntent, CompilationContext, CompilationResult, JoinIntent};

use render::{AggregateColumn, SqlPrinter, aggregate_call, qualified, quote_ident, table_name};

/// Alias of the base table in the generated query.
pub const BASE_ALIAS: &str = "s";

/// Primary key column every joined table is assumed to have.
pub const PRIMARY_KEY: &str = "id";

/// Column carrying the grouping key out of an aggregate subquery.
const GROUP_KEY: &str = "key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledQuery {
    pub query: String,
    /// Field name -> quoted column alias in the select list
    pub field_aliases: IndexMap<String, String>,
    /// One `<expr> AS "<field>"` per field, in input order
    pub select_expressions: Vec<String>,
    /// `FROM` line plus every join
    pub from_clause: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Nothing to select
    NoFields,
    /// An expression reads through a join that was never registered
    MissingJoinAlias(String),
    /// A multi-level join whose parent link is missing
    MissingParentJoin(String),
    /// An expression references an unregistered aggregate
    MissingAggregate(String),
    UnknownFunction(String),
    /// A formula was compiled against a different table
    BaseTableMismatch { expected: String, found: String },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::NoFields => write!(f, "No fields to assemble"),
            AssemblyError::MissingJoinAlias(id) => write!(f, "No alias for join {}", id),
            AssemblyError::MissingParentJoin(id) => {
                write!(f, "Parent join of {} was not registered", id)
            }
            AssemblyError::MissingAggregate(id) => write!(f, "Aggregate {} was not registered", id),
            AssemblyError::UnknownFunction(name) => {
                write!(f, "No SQL rendering for function {}", name)
            }
            AssemblyError::BaseTableMismatch { expected, found } => write!(
                f,
                "Formula compiled against table '{}' cannot be assembled on '{}'",
                found, expected
            ),
        }
    }
}

impl std::error::Error for AssemblyError {}

/// Aggregates sharing one relationship path.
struct AggregateGroup<'r> {
    alias: String,
    aggregates: Vec<&'r AggregateIntent>,
}

/// Build a single query selecting every compiled field from `base_table`.
pub fn assemble(
    results: &IndexMap<String, CompilationResult>,
    base_table: &str,
) -> Result<AssembledQuery, AssemblyError> {
    if results.is_empty() {
        return Err(AssemblyError::NoFields);
    }

    let mut joins: BTreeMap<&str, &JoinIntent> = BTreeMap::new();
    let mut aggregates: BTreeMap<&str, &AggregateIntent> = BTreeMap::new();
    for result in results.values() {
        for join in result.joins.values() {
            if join.chain.len() == 1 && join.source_table != base_table {
                return Err(mismatch(base_table, &join.source_table));
            }
            joins.entry(join.semantic_id.as_str()).or_insert(join);
        }
        for aggregate in result.aggregates.values() {
            if aggregate.source_table != base_table {
                return Err(mismatch(base_table, &aggregate.source_table));
            }
            aggregates
                .entry(aggregate.semantic_id.as_str())
                .or_insert(aggregate);
        }
    }

    // Aggregates over the same path share a subquery. Group order follows the
    // relation path so aliases are stable across runs.
    let mut by_relation: BTreeMap<&str, Vec<&AggregateIntent>> = BTreeMap::new();
    for aggregate in aggregates.values() {
        by_relation
            .entry(aggregate.relation.as_str())
            .or_default()
            .push(aggregate);
    }
    let groups: Vec<AggregateGroup> = by_relation
        .into_values()
        .enumerate()
        .map(|(i, aggregates)| AggregateGroup {
            alias: format!("agg_{}", i + 1),
            aggregates,
        })
        .collect();

    let mut reserved: HashSet<String> = HashSet::from([BASE_ALIAS.to_string()]);
    reserved.extend(groups.iter().map(|g| g.alias.clone()));

    let ordered_joins = ordered(joins.values().copied());
    let join_aliases = assign_join_aliases(&ordered_joins, &mut reserved);

    let mut aggregate_columns: BTreeMap<String, AggregateColumn> = BTreeMap::new();
    for group in &groups {
        for (i, aggregate) in group.aggregates.iter().enumerate() {
            aggregate_columns.insert(
                aggregate.semantic_id.clone(),
                AggregateColumn {
                    group_alias: group.alias.clone(),
                    column: format!("{}_{}", aggregate.function.name().to_ascii_lowercase(), i + 1),
                    function: aggregate.function,
                },
            );
        }
    }

    let mut from_lines = vec![format!(
        "FROM {} {}",
        table_name(base_table),
        quote_ident(BASE_ALIAS)
    )];
    from_lines.extend(join_lines(&ordered_joins, &join_aliases, BASE_ALIAS)?);
    for group in &groups {
        from_lines.push(aggregate_subquery(group, &aggregate_columns)?);
    }
    let from_clause = from_lines.join("\n");

    let printer = SqlPrinter {
        column_alias: BASE_ALIAS,
        joins: &join_aliases,
        aggregates: &aggregate_columns,
    };
    let mut field_aliases = IndexMap::new();
    let mut select_expressions = Vec::with_capacity(results.len());
    for (field, result) in results {
        let alias = quote_ident(field);
        select_expressions.push(format!("{} AS {}", printer.print(&result.expression)?, alias));
        field_aliases.insert(field.clone(), alias);
    }

    let query = format!(
        "SELECT\n  {}\n{}",
        select_expressions.join(",\n  "),
        from_clause
    );
    tracing::debug!(
        base_table,
        fields = results.len(),
        joins = ordered_joins.len(),
        aggregate_groups = groups.len(),
        "assembled query"
    );

    Ok(AssembledQuery {
        query,
        field_aliases,
        select_expressions,
        from_clause,
    })
}

fn mismatch(expected: &str, found: &str) -> AssemblyError {
    AssemblyError::BaseTableMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Parents before children, then by semantic id.
fn ordered<'r>(joins: impl Iterator<Item = &'r JoinIntent>) -> Vec<&'r JoinIntent> {
    let mut joins: Vec<&JoinIntent> = joins.collect();
    joins.sort_by(|a, b| {
        a.chain
            .len()
            .cmp(&b.chain.len())
            .then_with(|| a.semantic_id.cmp(&b.semantic_id))
    });
    joins
}

/// Alias per join semantic id. Single links are named after their target
/// table, longer chains after the relationship names; clashes get a numeric
/// suffix.
fn assign_join_aliases(
    joins: &[&JoinIntent],
    reserved: &mut HashSet<String>,
) -> BTreeMap<String, String> {
    let mut aliases = BTreeMap::new();
    for join in joins {
        let base = if join.chain.len() == 1 {
            alias_token(&join.target_table)
        } else {
            join.chain
                .iter()
                .map(|name| alias_token(name))
                .collect::<Vec<_>>()
                .join("_")
        };

        let mut alias = base.clone();
        let mut n = 2;
        while reserved.contains(&alias) {
            alias = format!("{}_{}", base, n);
            n += 1;
        }
        reserved.insert(alias.clone());
        aliases.insert(join.semantic_id.clone(), alias);
    }
    aliases
}

fn alias_token(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `LEFT JOIN` lines for `joins`; single links hang off `root_alias`.
fn join_lines(
    joins: &[&JoinIntent],
    aliases: &BTreeMap<String, String>,
    root_alias: &str,
) -> Result<Vec<String>, AssemblyError> {
    let by_chain: BTreeMap<(&[String], &CompilationContext), &str> = joins
        .iter()
        .filter_map(|join| {
            aliases
                .get(&join.semantic_id)
                .map(|alias| ((join.chain.as_slice(), &join.context), alias.as_str()))
        })
        .collect();

    joins
        .iter()
        .map(|join| {
            let alias = aliases
                .get(&join.semantic_id)
                .ok_or_else(|| AssemblyError::MissingJoinAlias(join.semantic_id.clone()))?;
            let parent = match join.parent_chain() {
                None => root_alias,
                Some(chain) => by_chain
                    .get(&(chain, &join.context))
                    .copied()
                    .ok_or_else(|| AssemblyError::MissingParentJoin(join.semantic_id.clone()))?,
            };
            Ok(format!(
                "LEFT JOIN {} {} ON {} = {}",
                table_name(&join.target_table),
                quote_ident(alias),
                qualified(parent, &join.join_column),
                qualified(alias, PRIMARY_KEY)
            ))
        })
        .collect()
}

/// One grouped subquery computing every aggregate of `group`.
///
/// Level `t1` is the first table of the path, grouped by its link column;
/// deeper levels are inner joined so only rows reachable through the whole
/// path are folded.
fn aggregate_subquery(
    group: &AggregateGroup,
    columns: &BTreeMap<String, AggregateColumn>,
) -> Result<String, AssemblyError> {
    let Some(first) = group.aggregates.first() else {
        return Ok(String::new());
    };
    let levels: Vec<String> = (1..=first.links.len()).map(|i| format!("t{}", i)).collect();
    let Some((root_link, deeper)) = first.links.split_first() else {
        return Err(AssemblyError::MissingAggregate(first.semantic_id.clone()));
    };
    let leaf_alias = levels.last().map_or("t1", String::as_str);

    let mut from = vec![format!(
        "    FROM {} {}",
        table_name(&root_link.table_name),
        quote_ident(&levels[0])
    )];
    for (i, link) in deeper.iter().enumerate() {
        from.push(format!(
            "    JOIN {} {} ON {} = {}",
            table_name(&link.table_name),
            quote_ident(&levels[i + 1]),
            qualified(&levels[i + 1], &link.join_column),
            qualified(&levels[i], PRIMARY_KEY)
        ));
    }

    // Joins the aggregated expressions need, shared inside this subquery.
    let mut inner: BTreeMap<&str, &JoinIntent> = BTreeMap::new();
    for aggregate in &group.aggregates {
        for join in aggregate.joins.values() {
            inner.entry(join.semantic_id.as_str()).or_insert(join);
        }
    }
    let inner = ordered(inner.values().copied());
    let mut reserved: HashSet<String> = levels.iter().cloned().collect();
    reserved.insert(GROUP_KEY.to_string());
    let inner_aliases = assign_join_aliases(&inner, &mut reserved);
    for line in join_lines(&inner, &inner_aliases, leaf_alias)? {
        from.push(format!("    {}", line));
    }

    let no_aggregates = BTreeMap::new();
    let printer = SqlPrinter {
        column_alias: leaf_alias,
        joins: &inner_aliases,
        aggregates: &no_aggregates,
    };
    let group_key = qualified(&levels[0], &root_link.join_column);
    let mut select = vec![format!("{} AS {}", group_key, quote_ident(GROUP_KEY))];
    for aggregate in &group.aggregates {
        let column = columns
            .get(&aggregate.semantic_id)
            .ok_or_else(|| AssemblyError::MissingAggregate(aggregate.semantic_id.clone()))?;
        let value = printer.print(&aggregate.expression)?;
        let delimiter = aggregate
            .delimiter
            .as_ref()
            .map(|d| printer.print(d))
            .transpose()?;
        select.push(format!(
            "{} AS {}",
            aggregate_call(aggregate.function, &value, delimiter.as_deref()),
            quote_ident(&column.column)
        ));
    }

    Ok(format!(
        "LEFT JOIN (\n    SELECT {}\n{}\n    GROUP BY {}\n) {} ON {} = {}",
        select.join(", "),
        from.join("\n"),
        group_key,
        quote_ident(&group.alias),
        qualified(&group.alias, GROUP_KEY),
        qualified(BASE_ALIAS, PRIMARY_KEY)
    ))
}
