use std::{
    io::{self, Write},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use crate::{
    defs::Defs,
    format,
    node::{Node, NodeKind},
};

#[derive(Debug, Error)]
pub enum Exception {
    #[error("wrong number of arguments to '{function}': expected {expected}, got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("'{function}' expects at least {expected} arguments, got {got}")]
    ArityAtLeast {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("argument {index} to '{function}' must be {expected}, not {got}")]
    Kind {
        function: String,
        index: usize,
        expected: NodeKind,
        got: NodeKind,
    },
    #[error("cannot call {got}: the head of an application must be a name")]
    Head { got: NodeKind },
    #[error("cannot call an empty list")]
    EmptyCall,
    #[error("'car' of an empty list")]
    CarOfEmpty,
    #[error("division by zero in '{function}'")]
    DivisionByZero { function: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("argument reference '{0}' used outside of a function")]
    NoFrame(String),
    #[error("malformed argument reference '{0}'")]
    MalformedArgumentRef(String),
    #[error("argument reference ':{index}' is out of range for a call with {len} entries")]
    ArgumentOutOfRange { index: i64, len: usize },
    #[error("missing argument for format directive '{{{directive}}}'")]
    MissingFormatArgument { directive: String },
    #[error("malformed format directive '{{{directive}}}'")]
    BadDirective { directive: String },
    #[error("cannot write program output: {0}")]
    Output(#[from] io::Error),
}

/// Walks node trees and produces node results.
///
/// The evaluator owns all interpreter state that outlives a single
/// expression: the function table, the stack of argument frames for the
/// user-function calls currently executing, and the PRNG backing `rand`.
/// Program output goes through the writer supplied at construction, which is
/// standard output in the CLI and a plain byte buffer in tests.
pub struct Evaluator<W> {
    pub defs: Defs,
    frames: Vec<Vec<Node>>,
    rng: StdRng,
    output: W,
}

impl<W: Write> Evaluator<W> {
    pub fn new(output: W) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        Self {
            defs: Defs::new(),
            frames: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            output,
        }
    }

    /// Evaluates every toplevel node in order, discarding the results.
    pub fn run(&mut self, program: &Node) -> Result<(), Exception> {
        let Node::Program(nodes) = program else {
            panic!("a Program node must be passed to `run`");
        };

        for node in nodes {
            self.eval(node)?;
        }
        Ok(())
    }

    pub fn eval(&mut self, node: &Node) -> Result<Node, Exception> {
        match node {
            Node::Program(_) => panic!("a Program cannot appear in expression position"),
            Node::List(nodes) => self.apply(nodes),
            Node::Int(_) | Node::String(_) => Ok(node.clone()),
            Node::Name(name) => {
                if name.starts_with(':') {
                    self.argument(name)
                } else {
                    // Names evaluate to themselves, which is what lets a name
                    // sit at the head of an application's list.
                    Ok(node.clone())
                }
            }
        }
    }

    fn apply(&mut self, nodes: &[Node]) -> Result<Node, Exception> {
        let Some(head) = nodes.first() else {
            return Err(Exception::EmptyCall);
        };

        let head = self.eval(head)?;
        let name = match head.as_name() {
            Some(name) => name.to_owned(),
            None => return Err(Exception::Head { got: head.kind() }),
        };

        // Special forms get the list unevaluated; they decide themselves
        // which children to evaluate.
        match name.as_str() {
            "if" => return self.special_if(nodes),
            "define" => return self.special_define(nodes),
            _ => (),
        }

        let mut args = Vec::with_capacity(nodes.len());
        args.push(head);
        for node in &nodes[1..] {
            args.push(self.eval(node)?);
        }

        self.call(&name, args)
    }

    /// `[if COND TRUE-EXPR ELSE-EXPR?]`. Only the selected branch is evaluated.
    fn special_if(&mut self, nodes: &[Node]) -> Result<Node, Exception> {
        if nodes.len() < 3 {
            return Err(Exception::ArityAtLeast {
                function: "if".into(),
                expected: 2,
                got: nodes.len() - 1,
            });
        }

        let condition = self.eval(&nodes[1])?;
        let Some(condition) = condition.to_int() else {
            return Err(Exception::Kind {
                function: "if".into(),
                index: 1,
                expected: NodeKind::Int,
                got: condition.kind(),
            });
        };

        if condition != 0 {
            self.eval(&nodes[2])
        } else if let Some(else_expr) = nodes.get(3) {
            self.eval(else_expr)
        } else {
            Ok(Node::Int(0))
        }
    }

    /// `[define NAME BODY-EXPR+]`. Returns the name as a value.
    fn special_define(&mut self, nodes: &[Node]) -> Result<Node, Exception> {
        if nodes.len() < 3 {
            return Err(Exception::ArityAtLeast {
                function: "define".into(),
                expected: 2,
                got: nodes.len() - 1,
            });
        }

        let Node::Name(name) = &nodes[1] else {
            return Err(Exception::Kind {
                function: "define".into(),
                index: 1,
                expected: NodeKind::Name,
                got: nodes[1].kind(),
            });
        };

        debug!("defining function '{name}'");
        self.defs.insert(name.clone(), nodes[2..].to_vec());
        Ok(nodes[1].clone())
    }

    /// Dispatches an application whose arguments are already evaluated.
    /// `args[0]` is the function-name node, `args[1..]` are the arguments.
    fn call(&mut self, name: &str, mut args: Vec<Node>) -> Result<Node, Exception> {
        match name {
            "+" | "-" | "*" | "/" | "%" | "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                arithmetic(name, &args)
            }

            "list" => Ok(Node::List(args.split_off(1))),

            "len" => {
                expect_arity(name, &args, 1)?;
                let list = list_arg(name, &args, 1)?;
                Ok(Node::Int(list.len() as i64))
            }

            "append" => {
                expect_arity(name, &args, 2)?;
                let first = list_arg(name, &args, 1)?;
                let second = list_arg(name, &args, 2)?;
                Ok(Node::List(first.iter().chain(second).cloned().collect()))
            }

            "car" => {
                expect_arity(name, &args, 1)?;
                let list = list_arg(name, &args, 1)?;
                list.first().cloned().ok_or(Exception::CarOfEmpty)
            }

            "cdr" => {
                expect_arity(name, &args, 1)?;
                let list = list_arg(name, &args, 1)?;
                Ok(Node::List(list.get(1..).unwrap_or_default().to_vec()))
            }

            "rand" => {
                expect_arity(name, &args, 0)?;
                Ok(Node::Int(self.rng.gen_range(0..i64::MAX)))
            }

            "print" => {
                expect_arity(name, &args, 1)?;
                let value = args.swap_remove(1);
                writeln!(self.output, "{value}")?;
                Ok(value)
            }

            "fmt" => format::expand(name, &args).map(Node::String),

            "pfmt" => {
                let string = format::expand(name, &args)?;
                self.output.write_all(string.as_bytes())?;
                Ok(Node::String(string))
            }

            _ => self.call_user(name, args),
        }
    }

    fn call_user(&mut self, name: &str, args: Vec<Node>) -> Result<Node, Exception> {
        let Some(body) = self.defs.get(name) else {
            return Err(Exception::UnknownFunction(name.into()));
        };
        // Walk a copy of the body. The call may redefine its own function,
        // and the current invocation must keep running the old definition.
        let body = body.to_vec();
        trace!("calling '{name}' with {} arguments", args.len() - 1);

        self.frames.push(args);
        let mut result = Ok(Node::Int(0));
        for node in &body {
            result = self.eval(node);
            if result.is_err() {
                break;
            }
        }
        self.frames.pop();
        result
    }

    /// Resolves a `:N` reference against the top argument frame.
    /// `:0` is the function name; `:1..` are the arguments in order.
    fn argument(&self, name: &str) -> Result<Node, Exception> {
        let index: i64 = name[1..]
            .parse()
            .map_err(|_| Exception::MalformedArgumentRef(name.into()))?;

        let Some(frame) = self.frames.last() else {
            return Err(Exception::NoFrame(name.into()));
        };

        // NOTE: Negative indices parse fine, so check them explicitly.
        if index < 0 || index as usize >= frame.len() {
            return Err(Exception::ArgumentOutOfRange {
                index,
                len: frame.len(),
            });
        }

        Ok(frame[index as usize].clone())
    }
}

fn arithmetic(function: &str, args: &[Node]) -> Result<Node, Exception> {
    expect_arity(function, args, 2)?;
    let a = int_arg(function, args, 1)?;
    let b = int_arg(function, args, 2)?;

    if b == 0 && matches!(function, "/" | "%") {
        return Err(Exception::DivisionByZero {
            function: function.into(),
        });
    }

    let result = match function {
        "+" => a.wrapping_add(b),
        "-" => a.wrapping_sub(b),
        "*" => a.wrapping_mul(b),
        "/" => a.wrapping_div(b),
        "%" => a.wrapping_rem(b),
        "==" => (a == b) as i64,
        "!=" => (a != b) as i64,
        "<" => (a < b) as i64,
        "<=" => (a <= b) as i64,
        ">" => (a > b) as i64,
        ">=" => (a >= b) as i64,
        _ => unreachable!("not an arithmetic builtin: {function}"),
    };
    Ok(Node::Int(result))
}

pub(crate) fn expect_arity(function: &str, args: &[Node], expected: usize) -> Result<(), Exception> {
    let got = args.len() - 1;
    if got != expected {
        return Err(Exception::Arity {
            function: function.into(),
            expected,
            got,
        });
    }
    Ok(())
}

pub(crate) fn int_arg(function: &str, args: &[Node], index: usize) -> Result<i64, Exception> {
    args[index].to_int().ok_or_else(|| Exception::Kind {
        function: function.into(),
        index,
        expected: NodeKind::Int,
        got: args[index].kind(),
    })
}

pub(crate) fn list_arg<'a>(
    function: &str,
    args: &'a [Node],
    index: usize,
) -> Result<&'a [Node], Exception> {
    args[index].as_list().ok_or_else(|| Exception::Kind {
        function: function.into(),
        index,
        expected: NodeKind::List,
        got: args[index].kind(),
    })
}
