use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;

/// Where the user lands: the list, the create form or the edit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    List,
    Add,
    Edit(u64),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::List => write!(f, "/"),
            Route::Add => write!(f, "/add"),
            Route::Edit(id) => write!(f, "/edit/{id}"),
        }
    }
}

impl FromStr for Route {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim().trim_end_matches('/');
        match path {
            "" => Ok(Route::List),
            "/add" => Ok(Route::Add),
            _ => {
                let id = path
                    .strip_prefix("/edit/")
                    .ok_or_else(|| anyhow!("unknown route: {s}"))?;
                let id = id
                    .parse::<u64>()
                    .map_err(|e| anyhow!("invalid task id in route {s}: {e}"))?;
                Ok(Route::Edit(id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip() {
        for route in [Route::List, Route::Add, Route::Edit(1700000000123)] {
            let parsed: Route = route.to_string().parse().expect("parse");
            assert_eq!(parsed, route);
        }
    }

    #[test]
    fn rejects_unknown_paths() {
        assert!("/edit/abc".parse::<Route>().is_err());
        assert!("/settings".parse::<Route>().is_err());
    }
}
