//! Expression tree of the reference guest language.
//!
//! Programs are JSON documents deserialized into [`Expr`]. Every node gets a
//! [`LocationId`] in preorder when it is wrapped in a [`Program`]; the ids of
//! instrumentable nodes double as the iids analyses see.

use serde::{Deserialize, Serialize};

use evtap_core::{LocationId, OperationKind, Value};

/// Binary and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Rem,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "??")]
    Coalesce,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
        }
    }

    /// Operators that may skip their right operand.
    pub fn short_circuits(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce)
    }
}

/// One expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(skip)]
    pub id: LocationId,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "camelCase")]
pub enum ExprKind {
    Lit {
        value: Value,
    },
    Var {
        name: String,
    },
    Let {
        name: String,
        value: Box<Expr>,
    },
    Assign {
        name: String,
        value: Box<Expr>,
    },
    Seq {
        body: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `receiver.callee(args)`, or a plain call when `receiver` is absent.
    Call {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    GetField {
        object: Box<Expr>,
        property: String,
    },
    GetElement {
        object: Box<Expr>,
        key: Box<Expr>,
    },
    /// Evaluates a string holding a JSON-encoded expression.
    Eval {
        code: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        #[serde(default)]
        otherwise: Option<Box<Expr>>,
        /// `a ? b : c` rather than an `if` statement.
        #[serde(default)]
        expression: bool,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Break,
    Continue,
    Throw {
        value: Box<Expr>,
    },
    Try {
        body: Box<Expr>,
        name: String,
        handler: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            id: LocationId::default(),
            line: 0,
            column: 0,
            kind,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn lit(value: Value) -> Self {
        Expr::new(ExprKind::Lit { value })
    }

    pub fn int(value: i64) -> Self {
        Expr::lit(Value::Int(value))
    }

    pub fn var(name: &str) -> Self {
        Expr::new(ExprKind::Var { name: name.into() })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Call {
            receiver: None,
            callee: Box::new(callee),
            args,
        })
    }

    pub fn seq(body: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Seq { body })
    }

    pub fn construct_name(&self) -> &'static str {
        match &self.kind {
            ExprKind::Lit { .. } => "lit",
            ExprKind::Var { .. } => "var",
            ExprKind::Let { .. } => "let",
            ExprKind::Assign { .. } => "assign",
            ExprKind::Seq { .. } => "seq",
            ExprKind::Binary { .. } => "binary",
            ExprKind::Call { .. } => "call",
            ExprKind::New { .. } => "new",
            ExprKind::GetField { .. } => "getField",
            ExprKind::GetElement { .. } => "getElement",
            ExprKind::Eval { .. } => "eval",
            ExprKind::If { .. } => "if",
            ExprKind::While { .. } => "while",
            ExprKind::Break => "break",
            ExprKind::Continue => "continue",
            ExprKind::Throw { .. } => "throw",
            ExprKind::Try { .. } => "try",
        }
    }

    /// The operation kind this node is instrumented as, if any.
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match &self.kind {
            ExprKind::Lit { .. } => Some(OperationKind::Literal),
            ExprKind::Binary { .. } => Some(OperationKind::Binary),
            ExprKind::Call { .. } => Some(OperationKind::Invoke),
            ExprKind::New { .. } => Some(OperationKind::New),
            ExprKind::GetField { .. } => Some(OperationKind::GetField),
            ExprKind::GetElement { .. } => Some(OperationKind::GetElement),
            ExprKind::Eval { .. } => Some(OperationKind::Eval),
            ExprKind::If { .. } => Some(OperationKind::Conditional),
            ExprKind::While { .. } => Some(OperationKind::Loop),
            _ => None,
        }
    }

    /// Number of operands reported through input events.
    pub fn input_count(&self) -> usize {
        match &self.kind {
            ExprKind::Binary { .. } | ExprKind::GetElement { .. } => 2,
            ExprKind::Call { args, .. } => 2 + args.len(),
            ExprKind::New { args, .. } => 1 + args.len(),
            ExprKind::GetField { .. } | ExprKind::Eval { .. } | ExprKind::If { .. } => 1,
            _ => 0,
        }
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Lit { .. } | ExprKind::Var { .. } | ExprKind::Break | ExprKind::Continue => {
                Vec::new()
            }
            ExprKind::Let { value, .. }
            | ExprKind::Assign { value, .. }
            | ExprKind::Throw { value } => vec![value.as_ref()],
            ExprKind::Seq { body } => body.iter().collect(),
            ExprKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            ExprKind::Call {
                receiver,
                callee,
                args,
            } => receiver
                .iter()
                .map(|r| r.as_ref())
                .chain(std::iter::once(callee.as_ref()))
                .chain(args.iter())
                .collect(),
            ExprKind::New { callee, args } => {
                std::iter::once(callee.as_ref()).chain(args.iter()).collect()
            }
            ExprKind::GetField { object, .. } => vec![object.as_ref()],
            ExprKind::GetElement { object, key } => vec![object.as_ref(), key.as_ref()],
            ExprKind::Eval { code } => vec![code.as_ref()],
            ExprKind::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                let mut out = vec![cond.as_ref(), then.as_ref()];
                out.extend(otherwise.as_deref());
                out
            }
            ExprKind::While { cond, body } => vec![cond.as_ref(), body.as_ref()],
            ExprKind::Try { body, handler, .. } => vec![body.as_ref(), handler.as_ref()],
        }
    }

    fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Lit { .. } | ExprKind::Var { .. } | ExprKind::Break | ExprKind::Continue => {
                Vec::new()
            }
            ExprKind::Let { value, .. }
            | ExprKind::Assign { value, .. }
            | ExprKind::Throw { value } => vec![value.as_mut()],
            ExprKind::Seq { body } => body.iter_mut().collect(),
            ExprKind::Binary { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            ExprKind::Call {
                receiver,
                callee,
                args,
            } => receiver
                .iter_mut()
                .map(|r| r.as_mut())
                .chain(std::iter::once(callee.as_mut()))
                .chain(args.iter_mut())
                .collect(),
            ExprKind::New { callee, args } => std::iter::once(callee.as_mut())
                .chain(args.iter_mut())
                .collect(),
            ExprKind::GetField { object, .. } => vec![object.as_mut()],
            ExprKind::GetElement { object, key } => vec![object.as_mut(), key.as_mut()],
            ExprKind::Eval { code } => vec![code.as_mut()],
            ExprKind::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                let mut out = vec![cond.as_mut(), then.as_mut()];
                out.extend(otherwise.as_deref_mut());
                out
            }
            ExprKind::While { cond, body } => vec![cond.as_mut(), body.as_mut()],
            ExprKind::Try { body, handler, .. } => vec![body.as_mut(), handler.as_mut()],
        }
    }

    /// Assigns preorder ids starting at `next`, returning the next free id.
    pub(crate) fn number(&mut self, next: u32) -> u32 {
        self.id = LocationId(next);
        let mut next = next + 1;
        for child in self.children_mut() {
            next = child.number(next);
        }
        next
    }
}

/// A numbered expression tree plus the file it came from.
#[derive(Debug, Clone)]
pub struct Program {
    pub file: String,
    pub root: Expr,
    end_id: u32,
}

impl Program {
    pub fn new(file: impl Into<String>, root: Expr) -> Self {
        Program::numbered_from(file, root, 0)
    }

    /// Numbers `root` starting at `first_id`.
    pub(crate) fn numbered_from(file: impl Into<String>, mut root: Expr, first_id: u32) -> Self {
        let end_id = root.number(first_id);
        Program {
            file: file.into(),
            root,
            end_id,
        }
    }

    pub fn from_json(file: impl Into<String>, source: &str) -> Result<Self, serde_json::Error> {
        let root: Expr = serde_json::from_str(source)?;
        Ok(Program::new(file, root))
    }

    /// One past the highest id in the tree.
    pub fn end_id(&self) -> u32 {
        self.end_id
    }

    /// Every node in preorder.
    pub fn preorder(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(expr) = stack.pop() {
            out.push(expr);
            stack.extend(expr.children().into_iter().rev());
        }
        out
    }
}
