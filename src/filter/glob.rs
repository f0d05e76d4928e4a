// ossbridge - object storage adapters for file-oriented access
// Copyright 2025 ossbridge developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component-wise glob evaluation with globstar and dotfile rules.

/// Outcome of evaluating a path against one glob.
///
/// `Partial` means the path is a prefix of some path the glob could
/// match; traversal-style operations accept it, file opens do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobMatch {
    None,
    Partial,
    Full,
}

/// One configured rule: the parsed absolute glob and whether wildcard
/// components may match names starting with a dot.
#[derive(Clone, Debug)]
pub struct GlobRule {
    pub match_dotfile: bool,
    pub components: Vec<String>,
}

impl GlobRule {
    pub fn parse(glob: &str, match_dotfile: bool) -> Option<GlobRule> {
        if !glob.starts_with('/') {
            return None;
        }
        Some(GlobRule {
            match_dotfile,
            components: glob
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn matches(&self, path: &str) -> GlobMatch {
        if !path.starts_with('/') {
            return GlobMatch::None;
        }
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        match_components(&components, &self.components, self.match_dotfile)
    }

    pub fn display(&self) -> String {
        format!("/{}", self.components.join("/"))
    }
}

fn is_dotfile(component: &str) -> bool {
    component.starts_with('.')
}

fn match_components(path: &[&str], glob: &[String], match_dotfile: bool) -> GlobMatch {
    let mut pi = 0usize;
    for (gi, pattern) in glob.iter().enumerate() {
        // The path has fewer components than the glob.  A trailing
        // globstar still matches against zero components, making this a
        // full match; anything else leaves the path a prefix.
        if pi >= path.len() {
            if pattern == "**" && gi + 1 == glob.len() {
                return GlobMatch::Full;
            }
            return GlobMatch::Partial;
        }

        if pattern == "**" {
            if gi + 1 == glob.len() {
                // A trailing globstar matches anything beneath, but it
                // still refuses to traverse dotfile components unless
                // the rule allows them.
                if !match_dotfile && path[pi..].iter().any(|c| is_dotfile(c)) {
                    return GlobMatch::None;
                }
                return GlobMatch::Full;
            }
            let rest_glob = &glob[gi + 1..];
            let rest_path = &path[pi..];

            // Dotfile components are only traversed by the globstar when
            // the rule allows them.
            let has_dotfile = !match_dotfile && rest_path.iter().any(|c| is_dotfile(c));

            // The globstar consumes zero or more whole components: try
            // every split point, shortest remainder first.
            let mut potential = true;
            for split in (0..rest_path.len()).rev() {
                let consumed_has_dotfile =
                    has_dotfile && rest_path[..split].iter().any(|c| is_dotfile(c));
                match match_components(&rest_path[split..], rest_glob, match_dotfile) {
                    GlobMatch::Full if !consumed_has_dotfile => return GlobMatch::Full,
                    GlobMatch::Full | GlobMatch::Partial if consumed_has_dotfile => {
                        potential = false;
                    }
                    GlobMatch::Partial => {}
                    GlobMatch::None => {
                        if has_dotfile {
                            potential = false;
                        }
                    }
                    GlobMatch::Full => {}
                }
            }
            // The globstar can always consume all remaining components,
            // leaving the path a prefix of a potential match.
            return if potential {
                GlobMatch::Partial
            } else {
                GlobMatch::None
            };
        }

        if !component_match(pattern, path[pi], match_dotfile) {
            return GlobMatch::None;
        }
        pi += 1;
    }

    // Glob consumed; leftover path components mean no match.
    if pi == path.len() {
        GlobMatch::Full
    } else {
        GlobMatch::None
    }
}

/// fnmatch-style single-component match: `*`, `?` and `[…]`, with the
/// leading-dot rule applied unless the rule matches dotfiles.
fn component_match(pattern: &str, name: &str, match_dotfile: bool) -> bool {
    if !match_dotfile && name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    wildcard_match(pattern.as_bytes(), name.as_bytes())
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                b'?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                b'*' => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                b'[' => {
                    if let Some((matched, next_p)) = bracket_match(pattern, p, text[t]) {
                        if matched {
                            p = next_p;
                            t += 1;
                            continue;
                        }
                    }
                }
                c if c == text[t] => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
        }
        // Mismatch: backtrack to the last star, widening its span.
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

/// Evaluates a `[…]` set at `pattern[start]` against `c`.  Returns the
/// match outcome and the index just past the closing bracket, or `None`
/// when the set is unterminated.
fn bracket_match(pattern: &[u8], start: usize, c: u8) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some(b'!') | Some(b'^'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let cur = pattern[i];
        if cur == b']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        // Range such as a-z; a trailing '-' is a literal.
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            if cur <= c && c <= pattern[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if cur == c {
                matched = true;
            }
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(glob: &str) -> GlobRule {
        GlobRule::parse(glob, false).unwrap()
    }

    fn rule_all(glob: &str) -> GlobRule {
        GlobRule::parse(glob, true).unwrap()
    }

    #[test]
    fn literal_components() {
        assert_eq!(rule("/a/b/c").matches("/a/b/c"), GlobMatch::Full);
        assert_eq!(rule("/a/b/c").matches("/a/b"), GlobMatch::Partial);
        assert_eq!(rule("/a/b").matches("/a/b/c"), GlobMatch::None);
        assert_eq!(rule("/a/b").matches("/a/x"), GlobMatch::None);
    }

    #[test]
    fn wildcards_within_components() {
        let r = rule("/prefix3/*/*.txt");
        assert_eq!(r.matches("/prefix3"), GlobMatch::Partial);
        assert_eq!(r.matches("/prefix3/subdir1"), GlobMatch::Partial);
        assert_eq!(r.matches("/prefix3/subdir1/idx0.txt"), GlobMatch::Full);
        assert_eq!(r.matches("/prefix3/subdir1/idx0.bin"), GlobMatch::None);

        assert_eq!(rule("/d/file?.txt").matches("/d/file1.txt"), GlobMatch::Full);
        assert_eq!(rule("/d/file?.txt").matches("/d/file12.txt"), GlobMatch::None);
        assert_eq!(rule("/d/idx[0-3].txt").matches("/d/idx2.txt"), GlobMatch::Full);
        assert_eq!(rule("/d/idx[0-3].txt").matches("/d/idx7.txt"), GlobMatch::None);
        assert_eq!(rule("/d/idx[!0-3].txt").matches("/d/idx7.txt"), GlobMatch::Full);
    }

    #[test]
    fn trailing_globstar_matches_anything_beneath() {
        let r = rule("/foo/**");
        assert_eq!(r.matches("/foo"), GlobMatch::Full);
        assert_eq!(r.matches("/foo/bar"), GlobMatch::Full);
        assert_eq!(r.matches("/foo/bar/baz/idx.txt"), GlobMatch::Full);
        assert_eq!(r.matches("/foobar"), GlobMatch::None);
    }

    #[test]
    fn globstar_dotfile_rules() {
        let plain = rule("/foo/**");
        assert_eq!(plain.matches("/foo/bar/idx.txt"), GlobMatch::Full);
        assert_eq!(plain.matches("/foo/.bar/idx.txt"), GlobMatch::None);
        assert_eq!(rule_all("/foo/**").matches("/foo/.bar/idx.txt"), GlobMatch::Full);

        let nested = rule("/foo/**/idx.txt");
        assert_eq!(nested.matches("/foo/.bar/idx.txt"), GlobMatch::None);
        assert_eq!(nested.matches("/foo/bar/idx.txt"), GlobMatch::Full);

        let all = rule_all("/foo/**/idx.txt");
        assert_eq!(all.matches("/foo/.bar/idx.txt"), GlobMatch::Full);
    }

    #[test]
    fn globstar_with_explicit_dot_components() {
        let r = rule("/foo/**/.bar/idx.txt");
        assert_eq!(r.matches("/foo/1/.bar/idx.txt"), GlobMatch::Full);
        // A dotfile consumed by the globstar itself still blocks.
        assert_eq!(r.matches("/foo/.1/.bar/idx.txt"), GlobMatch::None);
    }

    #[test]
    fn globstar_partial_with_dotfile_flag() {
        let r = rule_all("/foo/**/bar.txt");
        assert_eq!(r.matches("/foo/.bar/idx.txt"), GlobMatch::Partial);
        let strict = rule("/foo/**/bar.txt");
        assert_eq!(strict.matches("/foo/.bar/idx.txt"), GlobMatch::None);
    }

    #[test]
    fn dotfiles_require_explicit_dot_or_flag() {
        assert_eq!(rule("/d/*").matches("/d/.hidden"), GlobMatch::None);
        assert_eq!(rule("/d/.*").matches("/d/.hidden"), GlobMatch::Full);
        assert_eq!(rule_all("/d/*").matches("/d/.hidden"), GlobMatch::Full);
        assert_eq!(rule("/d/?idden").matches("/d/.hidden"), GlobMatch::None);
    }

    #[test]
    fn globstar_in_the_middle() {
        let r = rule("/foo/**/2*/bar");
        assert_eq!(r.matches("/foo/1/22/bar"), GlobMatch::Full);
        assert_eq!(r.matches("/foo/1/33/bar"), GlobMatch::Partial);
        assert_eq!(r.matches("/foo"), GlobMatch::Partial);

        let idx = rule("/foo/**/idx.txt");
        // The globstar can consume all the components so far, so this
        // could still become /foo/bar/baz/idx.txt.
        assert_eq!(idx.matches("/foo/bar/baz"), GlobMatch::Partial);
        assert_eq!(idx.matches("/foo/bar/baz/idx.txt"), GlobMatch::Full);
    }

    #[test]
    fn relative_paths_and_globs_are_rejected() {
        assert!(GlobRule::parse("relative/glob", false).is_none());
        assert_eq!(rule("/a/b").matches("a/b"), GlobMatch::None);
    }

    #[test]
    fn wildcard_engine_corner_cases() {
        assert!(wildcard_match(b"*", b""));
        assert!(wildcard_match(b"a*b*c", b"aXbYc"));
        assert!(!wildcard_match(b"a*b*c", b"aXbY"));
        assert!(wildcard_match(b"[]]", b"]"));
        assert!(wildcard_match(b"x[-a]y", b"x-y"));
        // Unterminated set never matches.
        assert!(!wildcard_match(b"[abc", b"a"));
    }
}
