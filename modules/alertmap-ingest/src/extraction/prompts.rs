/// Split/filter instructions. `{locality}` is substituted at call time.
const SPLIT_FILTER: &str = r#"You read public announcements collected for the municipality of {locality}: utility outages, weather warnings, road and construction closures.

The input may contain several unrelated announcements. Split it into separate messages, one per announcement, and for each return:
- plain_text: the announcement text without markup, in its original language
- markdown_text: the same text formatted as markdown
- is_relevant: true only if it affects {locality} or places within it
- is_informative: true if it carries concrete, actionable information (what, where, when); false for greetings, ads, navigation text
- is_one_of_many: true if the input contained more than one announcement
- responsible_entity: the utility, agency, or contractor responsible, if named

Never leave plain_text empty for a relevant message."#;

const CATEGORIZE: &str = r#"Classify a public announcement for {locality}.

Return every category that applies as a lowercase slug from this list:
water, electricity, heating, gas, road-closure, construction, public-transport, weather, health, waste, other.

Return an empty list if the announcement is not about a disruption or hazard."#;

const EXTRACT_LOCATIONS: &str = r#"Extract every location referenced in a public announcement for {locality}.

- pins: single addresses or named places. Include coordinates only if the text states them.
- street_sections: a street plus the two endpoints (cross streets or house numbers) bounding the affected section.
- cadastral_parcels: cadastral identifiers such as 68134.4083.412.
- bus_stops: public transport stop codes.
- with_specific_address: true if at least one concrete address is mentioned.
- city_wide: true if the announcement applies to the entire municipality.

For every item, list the time windows it applies to as timespans with start and end written exactly as dd.mm.yyyy hh:mm in local time. Omit a bound that is not stated."#;

pub fn split_filter(locality: &str) -> String {
    SPLIT_FILTER.replace("{locality}", locality)
}

pub fn categorize(locality: &str) -> String {
    CATEGORIZE.replace("{locality}", locality)
}

pub fn extract_locations(locality: &str) -> String {
    EXTRACT_LOCATIONS.replace("{locality}", locality)
}
