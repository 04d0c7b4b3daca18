use chrono::{Duration, Local, Months};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;

/// Row counts written by the demo seeder, reported back to the caller.
#[derive(Debug)]
pub struct SeedSummary {
    pub class_types: usize,
    pub positions: usize,
    pub employees: usize,
    pub subjects: usize,
    pub classes: usize,
    pub students: usize,
    pub schedules: usize,
}

const CLASS_TYPE_NAMES: [&str; 10] = [
    "Начальный",
    "Средний",
    "Старший",
    "Подготовительный",
    "Младший",
    "Технический",
    "Гуманитарный",
    "Естественный",
    "Математический",
    "Художественный",
];

const POSITION_NAMES: [&str; 5] = [
    "Учитель математики",
    "Учитель русского языка",
    "Учитель физики",
    "Учитель истории",
    "Учитель химии",
];

const SUBJECT_NAMES: [&str; 5] = ["Математика", "Русский язык", "История", "Физика", "Химия"];

const EMPLOYEE_FIRST_NAMES: [&str; 5] = ["Андрей", "Виктор", "Олег", "Татьяна", "Наталья"];
const EMPLOYEE_LAST_NAMES: [&str; 5] = ["Ковалев", "Романов", "Морозов", "Иванова", "Смирнова"];
const EMPLOYEE_MIDDLE_NAMES: [&str; 5] =
    ["Андреевич", "Викторович", "Олегович", "Татьяновна", "Натальевна"];

const CLASS_NAMES: [&str; 5] = ["1А", "2Б", "3В", "4Г", "5Д"];
const CLASS_TEACHERS: [&str; 5] = [
    "Иванова Т.В.",
    "Петров А.В.",
    "Сидорова Е.Г.",
    "Кузнецов Н.Д.",
    "Морозова Л.В.",
];

const FIRST_NAMES: [&str; 10] = [
    "Иван", "Дмитрий", "Алексей", "Сергей", "Анна", "Мария", "Екатерина", "Ольга", "Наталья",
    "Татьяна",
];
const LAST_NAMES: [&str; 10] = [
    "Иванов", "Петров", "Сидоров", "Кузнецов", "Смирнов", "Морозов", "Попов", "Васильев",
    "Михайлов", "Новиков",
];
const MIDDLE_NAMES: [&str; 10] = [
    "Александрович",
    "Викторович",
    "Сергеевич",
    "Михайлович",
    "Алексеевич",
    "Иванович",
    "Петровна",
    "Сергеевна",
    "Владимировна",
    "Дмитриевна",
];
const FATHER_NAMES: [&str; 5] = ["Александр", "Михаил", "Павел", "Сергей", "Владимир"];
const MOTHER_NAMES: [&str; 5] = ["Елена", "Ольга", "Татьяна", "Ирина", "Наталья"];
const GENDERS: [&str; 2] = ["Мужской", "Женский"];

const DAYS_OF_WEEK: [&str; 7] = [
    "Понедельник",
    "Вторник",
    "Среда",
    "Четверг",
    "Пятница",
    "Суббота",
    "Воскресенье",
];

fn pick<'a>(rng: &mut StdRng, pool: &[&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

/// Populate an empty workspace with demo data. The RNG is seeded so repeated
/// first runs produce identical databases. Returns None when the database
/// already holds students.
pub fn seed_demo(conn: &mut Connection) -> anyhow::Result<Option<SeedSummary>> {
    let students_present: i64 =
        conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    if students_present > 0 {
        return Ok(None);
    }

    let mut rng = StdRng::seed_from_u64(1);
    let today = Local::now().date_naive();
    let current_year = i64::from(chrono::Datelike::year(&today));

    let tx = conn.transaction()?;

    for name in CLASS_TYPE_NAMES {
        tx.execute(
            "INSERT INTO class_types(name, description) VALUES(?, ?)",
            (name, format!("Описание типа {}", name)),
        )?;
    }

    {
        let mut stmt =
            tx.prepare("INSERT INTO positions(name, description, salary) VALUES(?, ?, ?)")?;
        for _ in 0..500 {
            let name = pick(&mut rng, &POSITION_NAMES);
            let described = pick(&mut rng, &POSITION_NAMES);
            let salary = 50_000 + rng.gen_range(0..10_000_i64);
            stmt.execute((name, format!("Описание должности {}", described), salary))?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO employees(first_name, last_name, middle_name, position_id)
             VALUES(?, ?, ?, ?)",
        )?;
        for _ in 0..500 {
            stmt.execute((
                pick(&mut rng, &EMPLOYEE_FIRST_NAMES),
                pick(&mut rng, &EMPLOYEE_LAST_NAMES),
                pick(&mut rng, &EMPLOYEE_MIDDLE_NAMES),
                rng.gen_range(1..=500_i64),
            ))?;
        }
    }

    {
        let mut stmt =
            tx.prepare("INSERT INTO subjects(name, description, employee_id) VALUES(?, ?, ?)")?;
        for _ in 0..500 {
            let name = pick(&mut rng, &SUBJECT_NAMES);
            let described = pick(&mut rng, &SUBJECT_NAMES);
            stmt.execute((
                name,
                format!("Описание предмета {}", described),
                rng.gen_range(1..=500_i64),
            ))?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO classes(name, class_teacher, class_type_id, student_count, year_created)
             VALUES(?, ?, ?, ?, ?)",
        )?;
        for _ in 0..500 {
            stmt.execute((
                pick(&mut rng, &CLASS_NAMES),
                pick(&mut rng, &CLASS_TEACHERS),
                rng.gen_range(1..=10_i64),
                rng.gen_range(15..35_i64),
                current_year - rng.gen_range(1..10_i64),
            ))?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO students(first_name, last_name, middle_name, date_of_birth, gender,
                                  address, father_first_name, father_last_name,
                                  father_middle_name, mother_first_name, mother_last_name,
                                  mother_middle_name, class_id, additional_info)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for i in 0..20_000 {
            let years_back = rng.gen_range(6..18_u32);
            let dob = today
                .checked_sub_months(Months::new(years_back * 12))
                .unwrap_or(today);
            stmt.execute((
                pick(&mut rng, &FIRST_NAMES),
                pick(&mut rng, &LAST_NAMES),
                pick(&mut rng, &MIDDLE_NAMES),
                dob.format("%Y-%m-%d").to_string(),
                pick(&mut rng, &GENDERS),
                format!(
                    "ул. Примерная, д. {}, кв. {}",
                    rng.gen_range(1..100),
                    rng.gen_range(1..50)
                ),
                pick(&mut rng, &FATHER_NAMES),
                pick(&mut rng, &LAST_NAMES),
                pick(&mut rng, &MIDDLE_NAMES),
                pick(&mut rng, &MOTHER_NAMES),
                pick(&mut rng, &LAST_NAMES),
                pick(&mut rng, &MIDDLE_NAMES),
                // Demo students cluster into the first five classes.
                rng.gen_range(1..=5_i64),
                format!("Интересы: Спорт, Музыка, Чтение. Примечание {}.", i),
            ))?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO schedules(date, day_of_week, class_id, subject_id, start_time, end_time)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for _ in 0..20_000 {
            let date = today + Duration::days(rng.gen_range(-30..30_i64));
            stmt.execute((
                date.format("%Y-%m-%d").to_string(),
                pick(&mut rng, &DAYS_OF_WEEK),
                rng.gen_range(1..=5_i64),
                rng.gen_range(1..=5_i64),
                format!("{:02}:00", rng.gen_range(8..15)),
                format!("{:02}:00", rng.gen_range(16..18)),
            ))?;
        }
    }

    tx.commit()?;

    Ok(Some(SeedSummary {
        class_types: 10,
        positions: 500,
        employees: 500,
        subjects: 500,
        classes: 500,
        students: 20_000,
        schedules: 20_000,
    }))
}
