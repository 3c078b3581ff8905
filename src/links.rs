/// returns the search page offered when playback in the app fails
pub fn search_page_url(name: &str) -> String {
    let query = name
        .split_whitespace()
        .map(|word| urlencoding::encode(word).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    format!("https://www.youtube.com/results?search_query={query}")
}
