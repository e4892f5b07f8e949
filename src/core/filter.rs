//! 路径过滤
//!
//! 规则顺序：
//! 1. 命中任一排除模式即丢弃（不含 `/` 的排除模式同时匹配文件名；以 `/**` 结尾的排除模式同时排除该目录本身）；
//! 2. 包含列表为空，或完整匹配任一包含模式，则保留；
//! 3. 文件到此为止，不保留；
//! 4. 目录做"预判匹配"：如果某个包含模式的前缀能覆盖该目录，说明其后代仍可能命中，需要继续进入。
//!
//! 包含模式中的通配符不匹配以 `.` 开头的路径段，只有本身以 `.` 开头的模式段才能匹配隐藏文件或目录。

use crate::error::SyncError;
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

/// 包含模式按 `/` 切分后的单个段
#[derive(Debug, Clone)]
enum Segment {
    /// `**`，可吸收零个或多个路径段
    Globstar,
    Pattern {
        matcher: GlobMatcher,
        /// 模式段本身以 `.` 开头，可以匹配隐藏条目
        dot: bool,
    },
}

impl Segment {
    fn matches(&self, segment: &str) -> bool {
        let hidden = segment.starts_with('.');
        match self {
            Segment::Globstar => !hidden,
            Segment::Pattern { matcher, dot } => (!hidden || *dot) && matcher.is_match(segment),
        }
    }
}

/// 路径过滤器，每次运行构建一次，之后只读
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Vec<Segment>>,
    exclude: GlobSet,
    /// 不含 `/` 的排除模式，额外匹配文件名
    exclude_base: GlobSet,
    /// `x/**` 形式的排除模式去掉 `/**` 后的部分，用于直接剪掉目录 `x`
    exclude_dirs: GlobSet,
}

fn glob(pattern: &str) -> Result<Glob, SyncError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| SyncError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn build_set(patterns: &[&str]) -> Result<GlobSet, SyncError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(glob(pattern)?);
    }
    builder.build().map_err(|source| SyncError::InvalidPattern {
        pattern: patterns.join(", "),
        source,
    })
}

fn split_segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn compile_segments(pattern: &str) -> Result<Vec<Segment>, SyncError> {
    split_segments(pattern)
        .into_iter()
        .map(|seg| {
            if seg == "**" {
                Ok(Segment::Globstar)
            } else {
                Ok(Segment::Pattern {
                    matcher: glob(seg)?.compile_matcher(),
                    dot: seg.starts_with('.'),
                })
            }
        })
        .collect()
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, SyncError> {
        let exclude: Vec<&str> = exclude
            .iter()
            .map(|p| p.as_ref().trim_start_matches('/'))
            .collect();
        let exclude_base: Vec<&str> = exclude.iter().copied().filter(|p| !p.contains('/')).collect();
        let exclude_dirs: Vec<&str> = exclude
            .iter()
            .filter_map(|p| p.strip_suffix("/**"))
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            include: include
                .iter()
                .map(|p| compile_segments(p.as_ref()))
                .collect::<Result<_, _>>()?,
            exclude: build_set(&exclude)?,
            exclude_base: build_set(&exclude_base)?,
            exclude_dirs: build_set(&exclude_dirs)?,
        })
    }

    /// 判断相对路径是否需要保留
    pub fn keep(&self, relative_path: &str, is_dir: bool) -> bool {
        let path = relative_path.trim_matches('/');

        if self.is_excluded(path, is_dir) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }

        let segments = split_segments(path);
        let walks: Vec<Vec<bool>> = self
            .include
            .iter()
            .map(|pattern| walk(pattern, &segments))
            .collect();

        if walks
            .iter()
            .zip(&self.include)
            .any(|(states, pattern)| states[pattern.len()])
        {
            return true;
        }
        if !is_dir {
            return false;
        }
        walks.iter().any(|states| states.iter().any(|s| *s))
    }

    fn is_excluded(&self, path: &str, is_dir: bool) -> bool {
        if self.exclude.is_match(path) {
            return true;
        }
        if is_dir && self.exclude_dirs.is_match(path) {
            return true;
        }
        let base = path.rsplit('/').next().unwrap_or(path);
        self.exclude_base.is_match(base)
    }
}

/// 按段同步推进模式与路径，返回消耗完全部路径段后"模式中可能所处位置"的集合。
///
/// 普通段必须匹配对应的路径段才能前进，`**` 既可以原地吸收一个路径段，也可以直接跳过（吸收零个）。
/// 最后一个位置为真表示完整匹配；集合中任一位置为真表示该目录的后代仍可能匹配。
fn walk(pattern: &[Segment], path: &[&str]) -> Vec<bool> {
    let mut states = vec![false; pattern.len() + 1];
    states[0] = true;
    skip_globstars(pattern, &mut states);

    for segment in path {
        let mut next = vec![false; pattern.len() + 1];
        for (i, active) in states.iter().enumerate() {
            if !*active || i == pattern.len() || !pattern[i].matches(segment) {
                continue;
            }
            match &pattern[i] {
                Segment::Globstar => next[i] = true,
                Segment::Pattern { .. } => next[i + 1] = true,
            }
        }
        skip_globstars(pattern, &mut next);

        if !next.iter().any(|s| *s) {
            return next;
        }
        states = next;
    }

    states
}

fn skip_globstars(pattern: &[Segment], states: &mut [bool]) {
    for i in 0..pattern.len() {
        if states[i] && matches!(pattern[i], Segment::Globstar) {
            states[i + 1] = true;
        }
    }
}
