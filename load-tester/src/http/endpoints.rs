//! Endpoint templates

/// The fixed set of endpoints hit by the HTTP scenario, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEndpoint {
    Featured9Leagues,
    DailyMatches,
    LeagueSponsors,
    NewsSlider,
    Stories,
}

impl HttpEndpoint {
    pub const ALL: [HttpEndpoint; 5] = [
        HttpEndpoint::Featured9Leagues,
        HttpEndpoint::DailyMatches,
        HttpEndpoint::LeagueSponsors,
        HttpEndpoint::NewsSlider,
        HttpEndpoint::Stories,
    ];

    /// Step name used in reports and metrics
    pub fn step_name(&self) -> &'static str {
        match self {
            HttpEndpoint::Featured9Leagues => "featured_9_leagues",
            HttpEndpoint::DailyMatches => "daily_matches",
            HttpEndpoint::LeagueSponsors => "league_sponsors",
            HttpEndpoint::NewsSlider => "news_slider",
            HttpEndpoint::Stories => "stories",
        }
    }

    /// Full request URL. `match_date` is only used by `DailyMatches` and is
    /// percent-escaped before substitution.
    pub fn url(&self, base: &str, match_date: &str) -> String {
        match self {
            HttpEndpoint::Featured9Leagues => format!("{base}/League/get-featured-9-leagues"),
            HttpEndpoint::DailyMatches => format!(
                "{base}/Match/get-daily-matches?MatchDate={}&",
                urlencoding::encode(match_date)
            ),
            HttpEndpoint::LeagueSponsors => format!("{base}/League/get-league-sponsors?prefix="),
            HttpEndpoint::NewsSlider => format!(
                "{base}/News/get-all-news-paginated?page=1&pageSize=5&newsContextId=259&IsSlider=true&"
            ),
            HttpEndpoint::Stories => format!("{base}/Story/get-stories?"),
        }
    }
}
