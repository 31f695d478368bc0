//! Repeat-interval calendar strings of the DBMS job scheduler, e.g.
//! `FREQ=WEEKLY;BYDAY=MON,FRI;BYHOUR=6;BYMINUTE=30`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Row;

/// A calendar string split into the schedule form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepeatInterval {
    #[serde(rename = "jsscfreq")]
    pub frequency: Option<String>,
    #[serde(rename = "jsscdate")]
    pub date: Option<String>,
    #[serde(rename = "jsscmonths")]
    pub months: Vec<String>,
    #[serde(rename = "jsscmonthdays")]
    pub month_days: Vec<String>,
    #[serde(rename = "jsscweekdays")]
    pub week_days: Vec<String>,
    #[serde(rename = "jsschours")]
    pub hours: Vec<String>,
    #[serde(rename = "jsscminutes")]
    pub minutes: Vec<String>,
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn form_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Object(o) => o.get("value").and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => list(s),
        _ => Vec::new(),
    }
}

fn form_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

impl RepeatInterval {
    /// Parse a calendar string. Unknown sections are ignored.
    pub fn parse(calendar: &str) -> Self {
        let mut interval = RepeatInterval::default();
        for section in calendar.split(';') {
            let Some((key, value)) = section.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => interval.frequency = Some(value.trim().to_string()),
                "BYDATE" => interval.date = Some(value.trim().to_string()),
                "BYMONTH" => interval.months = list(value),
                "BYMONTHDAY" => interval.month_days = list(value),
                "BYDAY" => interval.week_days = list(value),
                "BYHOUR" => interval.hours = list(value),
                "BYMINUTE" => interval.minutes = list(value),
                _ => {}
            }
        }
        interval
    }

    /// Read the `jssc*` fields of a create form.
    pub fn from_form(data: &Row) -> Self {
        RepeatInterval {
            frequency: form_text(data.get("jsscfreq")),
            date: form_text(data.get("jsscdate")),
            months: form_list(data.get("jsscmonths")),
            month_days: form_list(data.get("jsscmonthdays")),
            week_days: form_list(data.get("jsscweekdays")),
            hours: form_list(data.get("jsschours")),
            minutes: form_list(data.get("jsscminutes")),
        }
    }

    /// Build the calendar string; empty fields are left out.
    pub fn to_calendar_string(&self) -> String {
        let mut sections = Vec::new();
        if let Some(freq) = &self.frequency {
            sections.push(format!("FREQ={}", freq));
        }
        if let Some(date) = &self.date {
            sections.push(format!("BYDATE={}", date));
        }
        for (key, values) in [
            ("BYMONTH", &self.months),
            ("BYMONTHDAY", &self.month_days),
            ("BYDAY", &self.week_days),
            ("BYHOUR", &self.hours),
            ("BYMINUTE", &self.minutes),
        ] {
            if !values.is_empty() {
                sections.push(format!("{}={}", key, values.join(",")));
            }
        }
        sections.join(";")
    }

    /// Write the fields into a properties row.
    pub fn apply_to(&self, row: &mut Row) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(self) {
            row.extend(fields);
        }
    }
}
