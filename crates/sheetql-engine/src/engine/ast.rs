//! Parsed statement tree.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub top: Option<Expr>,
    pub items: Vec<SelectItem>,
    pub into: Option<HookCall>,
    pub from: Option<FromClause>,
    pub selection: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    QualifiedWildcard(String),
    Expr {
        expr: Expr,
        /// Source text of the expression, used as the column name when there is no alias.
        label: String,
        alias: Option<String>,
    },
}

impl SelectItem {
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            SelectItem::Expr { expr, .. } => Some(expr),
            _ => None,
        }
    }
}

/// `NAME(arg, ...)` naming a FROM or INTO hook. The name is upper-cased.
#[derive(Clone, Debug, PartialEq)]
pub struct HookCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FromClause {
    pub table: TableRef,
    pub joins: Vec<Join>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub source: Source,
    pub alias: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    Hook(HookCall),
    Param(ParamRef),
    Subquery(Box<Select>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    pub target: HookCall,
    pub columns: Vec<String>,
    pub source: InsertSource,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InsertSource {
    Select(Box<Select>),
    Values(Vec<Vec<Expr>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamRef {
    /// Zero-based index of a `?` in the statement text.
    Positional(usize),
    Named(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column {
        table: Option<String>,
        name: String,
    },
    Param(ParamRef),
    Object(Vec<(String, Expr)>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    /// Function call; `star` marks `COUNT(*)`. The name is upper-cased.
    Function {
        name: String,
        args: Vec<Expr>,
        star: bool,
    },
}

impl Expr {
    /// Whether any function call in this expression satisfies `is_aggregate`.
    /// Does not look inside aggregate arguments.
    pub fn contains_aggregate(&self, is_aggregate: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Function { name, args, .. } => {
                is_aggregate(name) || args.iter().any(|a| a.contains_aggregate(is_aggregate))
            }
            Expr::Literal(_) | Expr::Column { .. } | Expr::Param(_) => false,
            Expr::Object(fields) => fields.iter().any(|(_, e)| e.contains_aggregate(is_aggregate)),
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => {
                expr.contains_aggregate(is_aggregate)
            }
            Expr::Binary { left, right, .. } => {
                left.contains_aggregate(is_aggregate) || right.contains_aggregate(is_aggregate)
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_aggregate(is_aggregate) || pattern.contains_aggregate(is_aggregate)
            }
            Expr::InList { expr, list, .. } => {
                expr.contains_aggregate(is_aggregate)
                    || list.iter().any(|e| e.contains_aggregate(is_aggregate))
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.contains_aggregate(is_aggregate)
                    || low.contains_aggregate(is_aggregate)
                    || high.contains_aggregate(is_aggregate)
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                operand
                    .as_ref()
                    .is_some_and(|e| e.contains_aggregate(is_aggregate))
                    || branches.iter().any(|(w, t)| {
                        w.contains_aggregate(is_aggregate) || t.contains_aggregate(is_aggregate)
                    })
                    || otherwise
                        .as_ref()
                        .is_some_and(|e| e.contains_aggregate(is_aggregate))
            }
        }
    }
}
