//! Name algebra: the marginal/conditional partition of a distribution's variables.
//!
//! Names follow `p(a,b=1|c)` style: marginal tokens left of `|`, conditional
//! tokens right of it, each token either a bare key or `key=value`.

use std::fmt;

use indexmap::IndexMap;
use pb_core::{Error, Result};

/// Separator between marginal and conditional groups.
pub const COND_DELIM: char = '|';
/// Separator between tokens within a group.
pub const TOKEN_DELIM: char = ',';
/// Separator between a key and its bound value.
pub const BIND_DELIM: char = '=';

/// Bare variable key of a token: the text before `=`, or the token itself.
pub fn bare_key(token: &str) -> &str {
    match token.find(BIND_DELIM) {
        Some(k) if k > 0 => &token[..k],
        _ => token,
    }
}

/// [`bare_key`] applied element-wise.
pub fn bare_keys<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens.iter().map(|t| bare_key(t.as_ref()).to_string()).collect()
}

/// Ordered marginal and conditional groups, each mapping key -> token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    marg: IndexMap<String, String>,
    cond: IndexMap<String, String>,
}

impl Partition {
    /// Build from ordered token lists, validating key uniqueness and disjointness.
    pub fn new<S: AsRef<str>>(marg: &[S], cond: &[S]) -> Result<Self> {
        let mut partition = Partition::default();
        for token in marg {
            partition.push(token.as_ref(), false)?;
        }
        for token in cond {
            partition.push(token.as_ref(), true)?;
        }
        Ok(partition)
    }

    fn push(&mut self, token: &str, conditional: bool) -> Result<()> {
        let token = token.trim();
        let key = bare_key(token);
        if key.is_empty() {
            return Err(Error::Format(format!("empty variable token in '{}'", token)));
        }
        if self.contains(key) {
            return Err(Error::Format(format!("variable '{}' appears more than once", key)));
        }
        let group = if conditional { &mut self.cond } else { &mut self.marg };
        group.insert(key.to_string(), token.to_string());
        Ok(())
    }

    /// Marginal key -> token map, in order.
    pub fn marg(&self) -> &IndexMap<String, String> {
        &self.marg
    }

    /// Conditional key -> token map, in order.
    pub fn cond(&self) -> &IndexMap<String, String> {
        &self.cond
    }

    /// Marginal keys in order.
    pub fn marg_keys(&self) -> Vec<String> {
        self.marg.keys().cloned().collect()
    }

    /// Conditional keys in order.
    pub fn cond_keys(&self) -> Vec<String> {
        self.cond.keys().cloned().collect()
    }

    /// All keys: marginals first, then conditionals.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.marg.keys().chain(self.cond.keys())
    }

    /// Whether `key` belongs to either group.
    pub fn contains(&self, key: &str) -> bool {
        self.marg.contains_key(key) || self.cond.contains_key(key)
    }

    /// Whether `key` is marginal.
    pub fn is_marginal(&self, key: &str) -> bool {
        self.marg.contains_key(key)
    }

    /// Whether `key` is conditional.
    pub fn is_conditional(&self, key: &str) -> bool {
        self.cond.contains_key(key)
    }

    /// Token for `key`, from whichever group holds it.
    pub fn token(&self, key: &str) -> Option<&str> {
        self.marg.get(key).or_else(|| self.cond.get(key)).map(String::as_str)
    }

    /// Number of keys across both groups.
    pub fn len(&self) -> usize {
        self.marg.len() + self.cond.len()
    }

    /// Whether both groups are empty.
    pub fn is_empty(&self) -> bool {
        self.marg.is_empty() && self.cond.is_empty()
    }

    /// Replace the token of an existing key, keeping its group and position.
    pub(crate) fn set_token(&mut self, key: &str, token: String) {
        if let Some(t) = self.marg.get_mut(key) {
            *t = token;
        } else if let Some(t) = self.cond.get_mut(key) {
            *t = token;
        }
    }

    /// Drop a marginal key. Returns its token.
    pub(crate) fn remove_marginal(&mut self, key: &str) -> Option<String> {
        self.marg.shift_remove(key)
    }

    /// Move a marginal key to the end of the conditional group.
    pub(crate) fn move_to_conditional(&mut self, key: &str) {
        if let Some(token) = self.marg.shift_remove(key) {
            self.cond.insert(key.to_string(), token);
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_name(self.marg.values(), self.cond.values()))
    }
}

impl std::str::FromStr for Partition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_partition(s)
    }
}

fn split_tokens(group: &str) -> Vec<&str> {
    if group.trim().is_empty() { Vec::new() } else { group.split(TOKEN_DELIM).collect() }
}

/// Parse a name such as `a,b=1|c` or `p(a,b=1|c)` into its partition.
pub fn parse_partition(name: &str) -> Result<Partition> {
    let mut inner = name.trim();
    if inner.is_empty() {
        return Ok(Partition::default());
    }

    let lt = inner.find('(');
    let rt = inner.rfind(')');
    match (lt, rt) {
        (None, None) => {}
        (Some(l), Some(r))
            if r > l && inner.matches('(').count() == 1 && inner.matches(')').count() == 1 =>
        {
            inner = &inner[l + 1..r];
        }
        _ => return Err(Error::Format(format!("unmatched parenthesis in name '{}'", name))),
    }

    let groups: Vec<&str> = inner.split(COND_DELIM).collect();
    let (marg_str, cond_str) = match groups.as_slice() {
        [marg] => (*marg, ""),
        [marg, cond] => (*marg, *cond),
        _ => return Err(Error::Format(format!("ambiguous name '{}': more than one '{}'", name, COND_DELIM))),
    };

    Partition::new(&split_tokens(marg_str), &split_tokens(cond_str))
}

/// Join marginal and conditional tokens into a name; `|` only if there are conditionals.
pub fn format_name<M, C>(marg: M, cond: C) -> String
where
    M: IntoIterator,
    M::Item: AsRef<str>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    let sep = TOKEN_DELIM.to_string();
    let join = |tokens: Vec<String>| tokens.join(sep.as_str());
    let marg_str = join(marg.into_iter().map(|t| t.as_ref().to_string()).collect());
    let cond_str = join(cond.into_iter().map(|t| t.as_ref().to_string()).collect());
    if cond_str.is_empty() { marg_str } else { format!("{}{}{}", marg_str, COND_DELIM, cond_str) }
}
