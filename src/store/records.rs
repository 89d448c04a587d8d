use super::query::{Field, FieldValue};
use super::{Collection, Record};
use crate::models::{City, Film, Keyword, Screening, Theatre};

fn merge_opt<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

fn opt_str(value: &Option<String>) -> Option<FieldValue<'_>> {
    value.as_deref().map(FieldValue::Str)
}

impl Record for City {
    const COLLECTION: Collection = Collection::Cities;

    fn natural_key(&self) -> String {
        self.city_name.clone()
    }

    fn merge(&mut self, newer: Self) {
        self.provider_ids.extend(newer.provider_ids);
        self.locators.extend(newer.locators);
    }

    fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        match field {
            Field::CityName => Some(FieldValue::Str(&self.city_name)),
            _ => None,
        }
    }
}

impl Record for Theatre {
    const COLLECTION: Collection = Collection::Theatres;

    fn natural_key(&self) -> String {
        self.theatre_name.clone()
    }

    fn merge(&mut self, newer: Self) {
        merge_opt(&mut self.city_name, newer.city_name);
        merge_opt(&mut self.provider_id, newer.provider_id);
        self.locators.extend(newer.locators);
    }

    fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        match field {
            Field::TheatreName => Some(FieldValue::Str(&self.theatre_name)),
            Field::CityName => opt_str(&self.city_name),
            Field::ProviderId => opt_str(&self.provider_id),
            _ => None,
        }
    }
}

impl Record for Film {
    const COLLECTION: Collection = Collection::Films;

    fn natural_key(&self) -> String {
        self.film_title.clone()
    }

    fn merge(&mut self, newer: Self) {
        self.provider_ids.extend(newer.provider_ids);
    }

    fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        match field {
            Field::FilmTitle => Some(FieldValue::Str(&self.film_title)),
            _ => None,
        }
    }
}

impl Record for Screening {
    const COLLECTION: Collection = Collection::Screenings;

    fn natural_key(&self) -> String {
        [
            self.city_name.as_str(),
            self.theatre_name.as_str(),
            self.film_title.as_str(),
            self.variant.as_str(),
            self.date.as_str(),
            self.time.as_str(),
        ]
        .join("|")
    }

    fn merge(&mut self, newer: Self) {
        merge_opt(&mut self.provider_id, newer.provider_id);
        merge_opt(&mut self.price_idr, newer.price_idr);
        merge_opt(&mut self.theatre_id, newer.theatre_id);
    }

    fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        match field {
            Field::CityName => Some(FieldValue::Str(&self.city_name)),
            Field::TheatreName => Some(FieldValue::Str(&self.theatre_name)),
            Field::FilmTitle => Some(FieldValue::Str(&self.film_title)),
            Field::Variant => Some(FieldValue::Str(&self.variant)),
            Field::Date => Some(FieldValue::Str(&self.date)),
            Field::Time => Some(FieldValue::Str(&self.time)),
            Field::ProviderId => opt_str(&self.provider_id),
            Field::PriceIdr => self.price_idr.map(FieldValue::Int),
            Field::TheatreId => opt_str(&self.theatre_id),
            Field::Keyword | Field::Kind => None,
        }
    }
}

impl Record for Keyword {
    const COLLECTION: Collection = Collection::Keywords;

    fn natural_key(&self) -> String {
        format!("{}|{}", self.kind, self.keyword)
    }

    fn merge(&mut self, newer: Self) {
        self.source_key = newer.source_key;
    }

    fn field(&self, field: Field) -> Option<FieldValue<'_>> {
        match field {
            Field::Keyword => Some(FieldValue::Str(&self.keyword)),
            Field::Kind => Some(FieldValue::Str(self.kind.as_str())),
            _ => None,
        }
    }
}
