//! Factory language for building workspace objects from short expressions.
//!
//! Supported statements:
//! - `x[80,200]`, `a[-0.01,-0.2,0.01]`, `mass[125]`: variable declarations
//! - `Gaussian::sig(x, mass[125], sigma[10])`, `Exponential:bkg(x, a)`
//! - `SUM::model(nsig[0,1e4]*sig, nbkg[0,1e4]*bkg)`; fractions form `SUM::m(f*sig, bkg)`
//! - `ASUM::model(S*sig_func, B*bkg_func)` over `HistFunc::name(x, dataset)`
//! - `prod::p(a, b)`, `expr::S('mu*L*binw', mu[1,-1,6], L, binw)` (products only)
//! - `HistPdf::name(x, dataset)`

use crate::var::RealVar;
use crate::workspace::{FuncNode, PdfNode, Workspace};
use mf_core::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Star,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let starts_number = c.is_ascii_digit()
            || ((c == '-' || c == '+' || c == '.')
                && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.'));
        match c {
            _ if c.is_whitespace() => i += 1,
            '[' => {
                out.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                out.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            ',' => {
                out.push(Token::Comma);
                i += 1;
            }
            ':' => {
                out.push(Token::Colon);
                i += 1;
            }
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..].iter().position(|&q| q == c).ok_or_else(|| {
                    Error::Parse(format!("unterminated string starting at column {i} in '{src}'"))
                })?;
                out.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            _ if starts_number => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let d = chars[i];
                    let exp_sign = (d == '-' || d == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exp_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let v = text
                    .parse::<f64>()
                    .map_err(|_| Error::Parse(format!("invalid number '{text}' in '{src}'")))?;
                out.push(Token::Number(v));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                out.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(Error::Parse(format!("unexpected character '{c}' in '{src}'"))),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
enum Atom {
    Name(String),
    Number(f64),
    Str(String),
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self> {
        Ok(Self { src, tokens: tokenize(src)?, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn err(&self, msg: &str) -> Error {
        Error::Parse(format!("{msg} at token {} in '{}'", self.pos, self.src))
    }

    fn expect(&mut self, tok: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            _ => Err(self.err(&format!("expected {tok:?}"))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// `name[v]`, `name[lo,hi]` or `name[v,lo,hi]`; `name` was already consumed.
    fn declaration(&mut self, ws: &mut Workspace, name: String) -> Result<String> {
        self.expect(Token::LBracket)?;
        let mut nums = Vec::new();
        loop {
            match self.next() {
                Some(Token::Number(v)) => nums.push(v),
                _ => return Err(self.err("expected number in variable declaration")),
            }
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err(self.err("expected ',' or ']'")),
            }
        }
        if ws.has_var(&name) {
            log::debug!("factory: variable '{name}' already declared, reusing it");
            return Ok(name);
        }
        let var = match nums.as_slice() {
            [v] => RealVar::constant(name.clone(), *v)?,
            [lo, hi] => RealVar::ranged(name.clone(), *lo, *hi)?,
            [v, lo, hi] => RealVar::new(name.clone(), *v, *lo, *hi)?,
            _ => {
                return Err(Error::Parse(format!(
                    "variable '{name}' takes 1 to 3 numbers, got {}",
                    nums.len()
                )));
            }
        };
        ws.import_var(var)?;
        Ok(name)
    }

    fn atom(&mut self, ws: &mut Workspace) -> Result<Atom> {
        match self.next() {
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LBracket) {
                    Ok(Atom::Name(self.declaration(ws, name)?))
                } else {
                    Ok(Atom::Name(name))
                }
            }
            Some(Token::Number(v)) => Ok(Atom::Number(v)),
            Some(Token::Str(s)) => Ok(Atom::Str(s)),
            _ => Err(self.err("expected argument")),
        }
    }

    /// Comma-separated arguments, each a `*`-separated list of atoms.
    fn arguments(&mut self, ws: &mut Workspace) -> Result<Vec<Vec<Atom>>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(args);
        }
        loop {
            let mut factors = vec![self.atom(ws)?];
            while self.peek() == Some(&Token::Star) {
                self.next();
                factors.push(self.atom(ws)?);
            }
            args.push(factors);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(self.err("expected ',' or ')'")),
            }
        }
        Ok(args)
    }
}

/// Resolve an atom to an object name, materializing numeric literals as constants.
fn resolve(ws: &mut Workspace, atom: &Atom) -> Result<String> {
    match atom {
        Atom::Name(n) => {
            if !ws.contains(n) {
                return Err(Error::NotFound(format!("factory: unknown object '{n}'")));
            }
            Ok(n.clone())
        }
        Atom::Number(v) => {
            let name = format!("{v}");
            if !ws.has_var(&name) {
                ws.import_var(RealVar::constant(name.clone(), *v)?)?;
            }
            Ok(name)
        }
        Atom::Str(s) => Err(Error::Parse(format!("unexpected string argument '{s}'"))),
    }
}

fn single(ws: &mut Workspace, args: &[Vec<Atom>], kind: &str, n: usize) -> Result<Vec<String>> {
    if args.len() != n || args.iter().any(|a| a.len() != 1) {
        return Err(Error::Parse(format!("{kind} expects {n} plain arguments")));
    }
    args.iter().map(|a| resolve(ws, &a[0])).collect()
}

fn dataset_arg(args: &[Vec<Atom>], kind: &str) -> Result<(String, String)> {
    match args {
        [x, d] if x.len() == 1 && d.len() == 1 => match (&x[0], &d[0]) {
            (Atom::Name(x), Atom::Name(d)) => Ok((x.clone(), d.clone())),
            _ => Err(Error::Parse(format!("{kind} expects (observable, dataset)"))),
        },
        _ => Err(Error::Parse(format!("{kind} expects (observable, dataset)"))),
    }
}

/// Parse a product formula such as `mu*L*binw` into factor names.
fn formula_factors(ws: &mut Workspace, formula: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for piece in formula.split('*') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(Error::Parse(format!("empty factor in formula '{formula}'")));
        }
        let atom = if let Ok(v) = piece.parse::<f64>() {
            Atom::Number(v)
        } else if piece.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
            Atom::Name(piece.to_string())
        } else {
            return Err(Error::Parse(format!(
                "unsupported formula '{formula}': only products of names and numbers are allowed"
            )));
        };
        out.push(resolve(ws, &atom)?);
    }
    Ok(out)
}

/// Execute one factory statement against `ws`.
pub(crate) fn execute(ws: &mut Workspace, expr: &str) -> Result<String> {
    let mut p = Parser::new(expr)?;
    let head = p.ident()?;

    let name = match p.peek() {
        Some(Token::LBracket) => p.declaration(ws, head)?,
        None => {
            if ws.contains(&head) {
                head
            } else {
                return Err(Error::NotFound(format!("factory: unknown object '{head}'")));
            }
        }
        Some(Token::Colon) => {
            p.next();
            if p.peek() == Some(&Token::Colon) {
                p.next();
            }
            let name = p.ident()?;
            let args = p.arguments(ws)?;
            create(ws, &head, &name, &args)?;
            name
        }
        _ => return Err(p.err("expected '[' or ':'")),
    };

    if !p.at_end() {
        return Err(p.err("trailing input"));
    }
    Ok(name)
}

fn create(ws: &mut Workspace, kind: &str, name: &str, args: &[Vec<Atom>]) -> Result<()> {
    match kind {
        "Gaussian" | "RooGaussian" => {
            let a = single(ws, args, kind, 3)?;
            ws.import_pdf(
                name,
                PdfNode::Gaussian { x: a[0].clone(), mean: a[1].clone(), sigma: a[2].clone() },
            )
        }
        "Exponential" | "RooExponential" => {
            let a = single(ws, args, kind, 2)?;
            ws.import_pdf(name, PdfNode::Exponential { x: a[0].clone(), c: a[1].clone() })
        }
        "SUM" => {
            let mut pdfs = Vec::new();
            let mut coefs = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                match arg.as_slice() {
                    [c, pdf] => {
                        coefs.push(resolve(ws, c)?);
                        pdfs.push(resolve(ws, pdf)?);
                    }
                    [pdf] if i + 1 == args.len() => pdfs.push(resolve(ws, pdf)?),
                    _ => {
                        return Err(Error::Parse(format!(
                            "SUM::{name}: argument {i} must be 'coef*pdf' (only the last may omit the coefficient)"
                        )));
                    }
                }
            }
            ws.import_pdf(name, PdfNode::Add { pdfs, coefs })
        }
        "ASUM" => {
            let mut funcs = Vec::new();
            let mut coefs = Vec::new();
            for (i, arg) in args.iter().enumerate() {
                match arg.as_slice() {
                    [c, f] => {
                        coefs.push(resolve(ws, c)?);
                        funcs.push(resolve(ws, f)?);
                    }
                    _ => {
                        return Err(Error::Parse(format!(
                            "ASUM::{name}: argument {i} must be 'coef*func'"
                        )));
                    }
                }
            }
            ws.import_pdf(name, PdfNode::RealSum { funcs, coefs })
        }
        "prod" => {
            let factors =
                args.iter().flatten().map(|a| resolve(ws, a)).collect::<Result<Vec<_>>>()?;
            ws.import_func(name, FuncNode::Product { factors })
        }
        "expr" => {
            let (formula, rest) = match args.split_first() {
                Some((first, rest)) => match first.as_slice() {
                    [Atom::Str(f)] => (f.clone(), rest),
                    _ => return Err(Error::Parse(format!("expr::{name} needs a quoted formula"))),
                },
                None => return Err(Error::Parse(format!("expr::{name} needs a quoted formula"))),
            };
            // Remaining arguments only declare variables used by the formula.
            for arg in rest {
                for a in arg {
                    resolve(ws, a)?;
                }
            }
            let factors = formula_factors(ws, &formula)?;
            ws.import_func(name, FuncNode::Product { factors })
        }
        "HistFunc" | "RooHistFunc" => {
            let (x, data) = dataset_arg(args, kind)?;
            ws.import_func(name, FuncNode::HistFunc { x, data })
        }
        "HistPdf" | "RooHistPdf" => {
            let (x, data) = dataset_arg(args, kind)?;
            ws.import_pdf(name, PdfNode::HistPdf { x, data })
        }
        other => Err(Error::Parse(format!("unsupported factory type '{other}'"))),
    }
}
