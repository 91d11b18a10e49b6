//! Fake data generators backing the `{{faker.*}}` placeholders.

use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Charles", "Karen", "Amara", "Kenji", "Lucia", "Mateo", "Priya", "Sven", "Yara", "Omar",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore", "Jackson",
    "Martin", "Lee", "Nakamura", "Okafor", "Novak", "Lindqvist", "Haddad", "Rossi",
];

const STREET_NAMES: &[&str] = &[
    "Main", "Oak", "Pine", "Maple", "Cedar", "Elm", "Washington", "Lake", "Hill", "Park",
    "Sunset", "River", "Church", "Mill",
];

const STREET_SUFFIXES: &[&str] = &["Street", "Avenue", "Road", "Lane", "Drive", "Court", "Way"];

const CITIES: &[&str] = &[
    "Springfield", "Riverside", "Franklin", "Greenville", "Bristol", "Clinton", "Fairview",
    "Salem", "Madison", "Georgetown", "Arlington", "Ashland",
];

const STATES: &[&str] = &["CA", "NY", "TX", "WA", "OR", "IL", "MA", "CO", "GA", "FL"];

const COMPANY_PREFIXES: &[&str] = &[
    "Acme", "Globex", "Initech", "Umbrella", "Stark", "Wayne", "Hooli", "Vandelay", "Soylent",
    "Cyberdyne", "Tyrell", "Wonka",
];

const COMPANY_SUFFIXES: &[&str] = &[
    "Inc", "LLC", "Group", "Corp", "Labs", "Industries", "Systems", "Partners",
];

const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur",
];

const COLORS: &[&str] = &[
    "red", "green", "blue", "yellow", "orange", "purple", "pink", "brown", "black", "white",
    "gray", "cyan", "magenta", "teal", "navy", "maroon", "olive", "lime", "indigo", "violet",
];

const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "example.net", "mail.test"];

const URL_WORDS: &[&str] = &[
    "alpha", "bright", "cloud", "delta", "echo", "forge", "grid", "harbor", "pixel", "quantum",
    "river", "summit",
];

const TLDS: &[&str] = &["com", "org", "net", "io", "dev"];

fn pick<R: Rng>(rng: &mut R, items: &'static [&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}

pub fn first_name<R: Rng>(rng: &mut R) -> String {
    pick(rng, FIRST_NAMES).to_string()
}

pub fn last_name<R: Rng>(rng: &mut R) -> String {
    pick(rng, LAST_NAMES).to_string()
}

pub fn full_name<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

pub fn username<R: Rng>(rng: &mut R) -> String {
    let first = pick(rng, FIRST_NAMES).to_lowercase();
    let last = pick(rng, LAST_NAMES).to_lowercase();
    let sep = if rng.gen_bool(0.5) { "_" } else { "." };
    format!("{}{}{}{}", first, sep, last, rng.gen_range(1..100))
}

pub fn email<R: Rng>(rng: &mut R) -> String {
    let first = pick(rng, FIRST_NAMES).to_lowercase();
    let last = pick(rng, LAST_NAMES).to_lowercase();
    format!("{}.{}@{}", first, last, pick(rng, EMAIL_DOMAINS))
}

pub fn avatar<R: Rng>(rng: &mut R) -> String {
    format!("https://i.pravatar.cc/150?img={}", rng.gen_range(1..=70))
}

pub fn phone<R: Rng>(rng: &mut R) -> String {
    format!(
        "+1-{:03}-{:03}-{:04}",
        rng.gen_range(200..1000),
        rng.gen_range(200..1000),
        rng.gen_range(0..10000)
    )
}

pub fn address<R: Rng>(rng: &mut R) -> String {
    format!(
        "{} {} {}, {}, {} {:05}",
        rng.gen_range(1..10000),
        pick(rng, STREET_NAMES),
        pick(rng, STREET_SUFFIXES),
        pick(rng, CITIES),
        pick(rng, STATES),
        rng.gen_range(10000..100000)
    )
}

pub fn company<R: Rng>(rng: &mut R) -> String {
    format!(
        "{} {}",
        pick(rng, COMPANY_PREFIXES),
        pick(rng, COMPANY_SUFFIXES)
    )
}

pub fn sentence<R: Rng>(rng: &mut R) -> String {
    let count = rng.gen_range(6..=12);
    let words: Vec<&str> = (0..count).map(|_| pick(rng, LOREM_WORDS)).collect();
    let mut sentence = words.join(" ");
    if let Some(first) = sentence.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    sentence.push('.');
    sentence
}

pub fn paragraph<R: Rng>(rng: &mut R) -> String {
    let count = rng.gen_range(3..=6);
    (0..count)
        .map(|_| sentence(rng))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn image<R: Rng>(rng: &mut R) -> String {
    format!("https://picsum.photos/seed/{}/640/480", rng.gen_range(1..100000))
}

pub fn color<R: Rng>(rng: &mut R) -> String {
    pick(rng, COLORS).to_string()
}

pub fn hex_color<R: Rng>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..=0xffffffu32))
}

pub fn url<R: Rng>(rng: &mut R) -> String {
    format!(
        "https://www.{}{}.{}",
        pick(rng, URL_WORDS),
        pick(rng, URL_WORDS),
        pick(rng, TLDS)
    )
}
