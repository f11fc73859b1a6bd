//! Filters and lookup options for repository queries.
//!
//! Repository queries are expressed in the document store's native filter
//! language (a BSON document such as `doc! { "name": { "$eq": "A" } }`) and
//! are handed to the store unmodified. For callers who prefer not to write
//! operator documents by hand, [`Filter`] builds an [`Expr`] tree which
//! [`FilterTranslator`] compiles into the same native form:
//!
//! ```ignore
//! use docrepo::query::Filter;
//!
//! let expr = Filter::eq("status", "active")
//!     .and(Filter::gt("age", 18));
//!
//! repository.find_all(expr, None).await?;
//! ```
//!
//! Every filter-taking repository operation accepts any [`IntoFilter`]:
//! a native document, `None` (match everything) or an [`Expr`].

use bson::{Bson, doc};

use crate::error::{RepositoryError, RepositoryResult};

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains substring, or array contains all given values.
    Contains,
    /// String does not contain substring, or array contains none of the given values.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field equals any of the values.
    AnyOf,
    /// Field equals none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Compiles this expression into a native filter document.
    ///
    /// # Errors
    ///
    /// Returns an error if an operator is used with a value it cannot apply to,
    /// e.g. `starts_with` with a number.
    pub fn to_filter(&self) -> RepositoryResult<bson::Document> {
        FilterTranslator.visit_expr(self)
    }
}

/// Helper struct for constructing filter expressions.
///
/// # Example
///
/// ```ignore
/// use docrepo::query::Filter;
///
/// let expr = Filter::eq("name", "Alice")
///     .and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value (case-insensitive).
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value (case-insensitive).
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values in the given array.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where the field equals none of the values in the given array.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<RepositoryError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

/// Compiles [`Expr`] trees into native filter documents.
pub struct FilterTranslator;

impl FilterTranslator {
    fn pattern(op: &FieldOp, value: &Bson, build: impl Fn(&str) -> String) -> RepositoryResult<bson::Document> {
        match value {
            Bson::String(s) => Ok(doc! { "$regex": build(&regex::escape(s)), "$options": "i" }),
            _ => Err(RepositoryError::InvalidDocument(format!(
                "{:?} operator requires a string value",
                op,
            ))),
        }
    }
}

impl QueryVisitor for FilterTranslator {
    type Output = bson::Document;
    type Error = RepositoryError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    // `$not` is only valid on a field, so a negated sub-filter becomes `$nor`.
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::Array(arr) => doc! { "$all": arr },
                    _ => Self::pattern(op, value, |s| s.to_string())?,
                },
                FieldOp::NotContains => match value {
                    Bson::Array(arr) => doc! { "$nin": arr },
                    _ => doc! { "$not": Self::pattern(op, value, |s| s.to_string())? },
                },
                FieldOp::StartsWith => Self::pattern(op, value, |s| format!("^{}", s))?,
                FieldOp::EndsWith => Self::pattern(op, value, |s| format!("{}$", s))?,
                FieldOp::AnyOf => match value {
                    Bson::Array(arr) => doc! { "$in": arr },
                    _ => doc! { "$in": [value] },
                },
                FieldOp::NoneOf => match value {
                    Bson::Array(arr) => doc! { "$nin": arr },
                    _ => doc! { "$nin": [value] },
                },
            }
        })
    }
}

/// Anything a repository accepts as a query filter.
pub trait IntoFilter {
    /// Produces the native filter document.
    ///
    /// # Errors
    ///
    /// Returns an error if a typed expression cannot be compiled.
    fn into_filter(self) -> RepositoryResult<bson::Document>;
}

impl IntoFilter for bson::Document {
    fn into_filter(self) -> RepositoryResult<bson::Document> {
        Ok(self)
    }
}

impl IntoFilter for Option<bson::Document> {
    fn into_filter(self) -> RepositoryResult<bson::Document> {
        Ok(self.unwrap_or_default())
    }
}

impl IntoFilter for Expr {
    fn into_filter(self) -> RepositoryResult<bson::Document> {
        self.to_filter()
    }
}

impl IntoFilter for &Expr {
    fn into_filter(self) -> RepositoryResult<bson::Document> {
        self.to_filter()
    }
}

/// Lookup options passed through to the store.
///
/// `sort` and `projection` use the store's native document syntax
/// (`doc! { "created": -1 }`, `doc! { "name": 1 }`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<bson::Document>,
    pub projection: Option<bson::Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: bson::Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: bson::Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}
