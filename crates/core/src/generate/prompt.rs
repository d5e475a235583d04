use crate::domain::contract::PRODUCTS_PER_MARKET;
use crate::generate::Constraints;
use crate::time::target_date::date_key;
use chrono::NaiveDate;

fn schema() -> String {
    [
        "{",
        "  \"location\": {\"en\": \"City, Country\", \"es\": \"Ciudad, País\"},",
        "  \"continent\": {\"en\": \"Continent\", \"es\": \"Continente\"},",
        "  \"heroImageDescription\": \"English prompt for the hero image\",",
        "  \"products\": [",
        "    {",
        "      \"title\": {\"en\": \"Name\", \"es\": \"Nombre\"},",
        "      \"imageDescription\": \"English prompt for the product image\",",
        "      \"description\": {\"en\": \"Short description\", \"es\": \"Descripción corta\"}",
        "    }",
        "  ],",
        "  \"funFact\": {\"en\": \"Fun fact\", \"es\": \"Dato curioso\"}",
        "}",
    ]
    .join("\n")
}

pub fn market_prompt(target_date: NaiveDate, constraints: &Constraints) -> String {
    let past_countries = if constraints.past_countries.is_empty() {
        "(none yet)".to_string()
    } else {
        constraints
            .past_countries
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Generate a panoramic market entry for date {date}.\n\
\n\
LOGIC REQUIREMENTS:\n\
- Country MUST NOT be in this list: {past_countries}.\n\
- Continent MUST BE DIFFERENT from: {last_continent}.\n\
\n\
ART DIRECTION (heroImageDescription, English):\n\
Describe a stunning wide shot of a traditional market in the chosen city.\n\
Capture the city's soul (e.g. Amsterdam canals, Marrakech souks).\n\
National Geographic style, cinematic lighting, 8k, detailed.\n\
\n\
PRODUCT ART DIRECTION (imageDescription, English):\n\
Professional macro photography of the product as found in this market, soft bokeh, 8k.\n\
\n\
LANGUAGES:\n\
- location, continent, title, description and funFact are objects with \"en\" and \"es\" keys.\n\
- location uses the form \"City, Country\" in both languages.\n\
- heroImageDescription and imageDescription are plain English strings.\n\
\n\
RETURN ONLY JSON. Do not wrap in markdown. No trailing commas. Schema:\n\
{schema}\n\
\n\
IMPORTANT: Generate exactly {count} products. They can be food, crafts, seeds,\n\
or anything typical of that market.",
        date = date_key(target_date),
        past_countries = past_countries,
        last_continent = constraints.last_continent,
        schema = schema(),
        count = PRODUCTS_PER_MARKET,
    )
}
